//! Python Bindings
//!
//! Exposes objects and property cells to Python. The runtime is
//! thread-local, so every class here is `unsendable`: a handle may only be
//! used on the thread that created it.
//!
//! Values cross the boundary as plain Python values: numbers, strings,
//! booleans, lists and `None`. Colours travel as `#rrggbb` strings and
//! object references as `Object` handles.

use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyTuple};

use crate::error::{Error, ScriptError};
use crate::object::Object;
use crate::reactive::{Binding, ConnectionKind, Handler, Property, Runtime, SetReason};
use crate::value::Value;

impl From<Error> for PyErr {
    fn from(err: Error) -> Self {
        match err {
            Error::Coercion(_) | Error::AnchorAxis { .. } => PyValueError::new_err(err.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }
}

fn to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::None => py.None(),
        Value::Number(n) => n.to_object(py),
        Value::String(s) => s.to_object(py),
        Value::Bool(b) => b.to_object(py),
        Value::Enum(e) => e.to_object(py),
        Value::Color(c) => c.to_string().into_py(py),
        Value::Object(o) => Py::new(py, PyObjectHandle { object: *o })?.into_py(py),
        Value::List(items) => {
            let items = items
                .iter()
                .map(|item| to_py(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new_bound(py, items).into_py(py)
        }
        Value::Element(_) => value.to_string().into_py(py),
    })
}

fn from_py(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::None);
    }
    if obj.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(obj.extract()?));
    }
    if let Ok(handle) = obj.extract::<PyRef<'_, PyObjectHandle>>() {
        return Ok(Value::Object(handle.object));
    }
    if let Ok(n) = obj.extract::<f64>() {
        return Ok(Value::Number(n));
    }
    if let Ok(s) = obj.extract::<String>() {
        return Ok(Value::String(s));
    }
    if obj.is_instance_of::<PyList>() || obj.is_instance_of::<PyTuple>() {
        let items = obj
            .iter()?
            .map(|item| from_py(&item?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(Value::List(items));
    }
    Err(PyTypeError::new_err(format!(
        "cannot convert {} to a property value",
        obj.get_type().name()?
    )))
}

/// Python-exposed object handle.
#[pyclass(name = "Object", unsendable)]
pub struct PyObjectHandle {
    object: Object,
}

#[pymethods]
impl PyObjectHandle {
    #[new]
    #[pyo3(signature = (class_name, parent = None))]
    fn new(class_name: &str, parent: Option<PyRef<'_, PyObjectHandle>>) -> Self {
        Self {
            object: Object::new(class_name, parent.map(|p| p.object)),
        }
    }

    /// Declare a property and return its handle.
    #[pyo3(signature = (name, type_name, initial = None))]
    fn declare_property(
        &self,
        name: &str,
        type_name: &str,
        initial: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<PyProperty> {
        let initial = initial.map(from_py).transpose()?.unwrap_or_default();
        let property = self.object.declare_property(name, type_name, initial)?;
        Ok(PyProperty { property })
    }

    fn property(&self, name: &str) -> Option<PyProperty> {
        self.object.property(name).map(|property| PyProperty { property })
    }

    #[getter]
    fn class_name(&self) -> Option<String> {
        self.object.class_name()
    }

    #[getter]
    fn alive(&self) -> bool {
        self.object.is_alive()
    }

    fn destroy(&self) {
        self.object.destroy();
    }

    fn __repr__(&self) -> String {
        format!("Object({})", self.object)
    }
}

/// Python-exposed property cell.
#[pyclass(name = "Property", unsendable)]
pub struct PyProperty {
    property: Property,
}

#[pymethods]
impl PyProperty {
    /// Read the value, recomputing it if needed.
    fn get(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_py(py, &self.property.get())
    }

    /// Write a literal value, removing any binding.
    fn set(&self, value: &Bound<'_, PyAny>) -> PyResult<()> {
        self.property.set(from_py(value)?, SetReason::User)?;
        Ok(())
    }

    /// Bind the property to a zero-argument callable.
    #[pyo3(signature = (callable, source = None))]
    fn bind(&self, callable: PyObject, source: Option<&str>) -> PyResult<()> {
        let source = source.unwrap_or("<python>");
        let binding = Binding::expression(source, move |_| {
            Python::with_gil(|py| {
                let result = callable.call0(py).map_err(ScriptError::new)?;
                from_py(result.bind(py)).map_err(ScriptError::new)
            })
        });
        self.property.bind(binding)?;
        Ok(())
    }

    /// Call `callable(new, old, name)` whenever the value changes.
    #[pyo3(signature = (callable, queued = false))]
    fn connect(&self, callable: PyObject, queued: bool) -> bool {
        let handler = Handler::new(move |args: &[Value]| {
            Python::with_gil(|py| {
                let args = args
                    .iter()
                    .map(|value| to_py(py, value))
                    .collect::<PyResult<Vec<_>>>()
                    .map_err(ScriptError::new)?;
                callable
                    .call1(py, PyTuple::new_bound(py, args))
                    .map(|_| ())
                    .map_err(ScriptError::new)
            })
        });
        let kind = if queued {
            ConnectionKind::Queued
        } else {
            ConnectionKind::Direct
        };
        self.property
            .changed()
            .connect_with(None, handler, kind)
            .is_connected()
    }

    #[getter]
    fn name(&self) -> Option<String> {
        self.property.name()
    }

    #[getter]
    fn dirty(&self) -> bool {
        self.property.is_dirty()
    }

    fn __repr__(&self) -> String {
        format!("Property({})", self.property)
    }
}

/// Run queued signal deliveries.
#[pyfunction]
pub fn drain_queued() -> usize {
    crate::reactive::drain_queued()
}

/// Diagnostic counters as a dict.
#[pyfunction]
pub fn diagnostics(py: Python<'_>) -> PyResult<Bound<'_, PyDict>> {
    let counters = Runtime::diagnostics();
    let dict = PyDict::new_bound(py);
    dict.set_item("binding_errors", counters.binding_errors)?;
    dict.set_item("binding_loops", counters.binding_loops)?;
    dict.set_item("handler_errors", counters.handler_errors)?;
    dict.set_item("queued_deliveries", counters.queued_deliveries)?;
    Ok(dict)
}
