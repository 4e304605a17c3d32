//! Backend adapter that runs graphs with dynamic shapes on a static-only backend.
//!
//! ```text
//! DynamicWrapperBackend<B>
//!      |
//!      +-- create_tensor / create_tensor_from_host ---> B
//!      |
//!      +-- create_dynamic_tensor ---> placeholder, bound by `write`
//!      |
//!      +-- compile(graph)
//!            static graph  ---> B::compile
//!            dynamic graph ---> DynamicExecutable
//!                                 call(inputs): specialize parameters to the input
//!                                 specs, re-infer, B::compile, cache per signature
//!                                 (least recently used signature evicted at capacity)
//! ```

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use crate::graph::Graph;
use crate::ops::Parameter;
use crate::types::{ElementType, PartialShape, Shape};

use super::{
    ensure_finalized, Backend, BackendError, BackendResult, Executable, HostTensor, TensorSpec,
};

/// Placeholder tensor whose storage is allocated on the wrapped backend when data is written.
#[derive(Debug, Clone)]
pub struct DynamicTensor<T> {
    element_type: ElementType,
    shape: PartialShape,
    storage: Arc<Mutex<Option<T>>>,
}

impl<T: Clone> DynamicTensor<T> {
    fn new(element_type: ElementType, shape: PartialShape) -> Self {
        Self {
            element_type,
            shape,
            storage: Arc::new(Mutex::new(None)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn partial_shape(&self) -> &PartialShape {
        &self.shape
    }

    fn bound(&self) -> BackendResult<Option<T>> {
        let storage = self
            .storage
            .lock()
            .map_err(|_| BackendError::execution("dynamic tensor storage poisoned"))?;
        Ok((*storage).clone())
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.bound(), Ok(Some(_)))
    }
}

#[derive(Debug, Clone)]
pub enum WrappedTensor<T> {
    Static(T),
    Dynamic(DynamicTensor<T>),
}

impl<T: Clone> WrappedTensor<T> {
    /// The wrapped backend's tensor; errors for a dynamic tensor nothing was written to.
    fn resolve(&self) -> BackendResult<T> {
        match self {
            WrappedTensor::Static(tensor) => Ok(tensor.clone()),
            WrappedTensor::Dynamic(dynamic) => dynamic.bound()?.ok_or_else(|| {
                BackendError::execution(format!(
                    "dynamic tensor {}{} has no data yet",
                    dynamic.element_type, dynamic.shape
                ))
            }),
        }
    }
}

/// Specializations kept per dynamic executable unless configured otherwise.
pub const DEFAULT_SPECIALIZATION_CACHE_CAPACITY: usize = 64;

fn default_cache_capacity() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_SPECIALIZATION_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)
}

/// Wraps `B`, adding dynamic tensors and call-time shape specialization.
pub struct DynamicWrapperBackend<B: Backend> {
    inner: Arc<B>,
    name: String,
    cache_capacity: NonZeroUsize,
}

impl<B: Backend> DynamicWrapperBackend<B> {
    pub fn new(inner: B) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<B>) -> Self {
        let name = format!("dynamic({})", inner.backend_name());
        Self {
            inner,
            name,
            cache_capacity: default_cache_capacity(),
        }
    }

    /// Bounds how many input signatures each compiled dynamic graph keeps specialized.
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        self.cache_capacity
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Binds `host` to a dynamic tensor, fixing its shape.
    pub fn write(&self, tensor: &WrappedTensor<B::Tensor>, host: &HostTensor) -> BackendResult<()> {
        let WrappedTensor::Dynamic(dynamic) = tensor else {
            return Err(BackendError::execution(
                "static tensors receive their data when created",
            ));
        };
        let actual = PartialShape::from(host.shape());
        if dynamic.element_type.merge(host.element_type()).is_none()
            || !actual.refines(&dynamic.shape)
        {
            return Err(BackendError::shape_mismatch(
                format!("{}{}", dynamic.element_type, dynamic.shape),
                host.spec(),
            ));
        }
        let materialized = self.inner.create_tensor_from_host(host)?;
        let mut storage = dynamic
            .storage
            .lock()
            .map_err(|_| BackendError::execution("dynamic tensor storage poisoned"))?;
        *storage = Some(materialized);
        Ok(())
    }
}

impl<B: Backend + 'static> Backend for DynamicWrapperBackend<B> {
    type Tensor = WrappedTensor<B::Tensor>;
    type Executable = WrappedExecutable<B>;

    fn backend_name(&self) -> &str {
        &self.name
    }

    fn create_tensor(
        &self,
        element_type: ElementType,
        shape: &Shape,
    ) -> BackendResult<Self::Tensor> {
        Ok(WrappedTensor::Static(
            self.inner.create_tensor(element_type, shape)?,
        ))
    }

    fn create_tensor_from_host(&self, host: &HostTensor) -> BackendResult<Self::Tensor> {
        Ok(WrappedTensor::Static(
            self.inner.create_tensor_from_host(host)?,
        ))
    }

    fn create_dynamic_tensor(
        &self,
        element_type: ElementType,
        shape: &PartialShape,
    ) -> BackendResult<Self::Tensor> {
        Ok(WrappedTensor::Dynamic(DynamicTensor::new(
            element_type,
            shape.clone(),
        )))
    }

    fn tensor_spec(&self, tensor: &Self::Tensor) -> BackendResult<TensorSpec> {
        self.inner.tensor_spec(&tensor.resolve()?)
    }

    fn read(&self, tensor: &Self::Tensor) -> BackendResult<HostTensor> {
        self.inner.read(&tensor.resolve()?)
    }

    fn compile(&self, graph: &Graph) -> BackendResult<Self::Executable> {
        if graph.is_static() {
            return Ok(WrappedExecutable::Static(self.inner.compile(graph)?));
        }
        debug!(
            "{}: deferring compilation of a dynamic graph with {} node(s)",
            self.name,
            graph.len()
        );
        Ok(WrappedExecutable::Dynamic(DynamicExecutable {
            inner: Arc::clone(&self.inner),
            graph: graph.clone(),
            cache: Mutex::new(LruCache::new(self.cache_capacity)),
        }))
    }
}

pub enum WrappedExecutable<B: Backend> {
    Static(B::Executable),
    Dynamic(DynamicExecutable<B>),
}

impl<B: Backend> Executable for WrappedExecutable<B> {
    type Tensor = WrappedTensor<B::Tensor>;

    fn call(&self, inputs: &[Self::Tensor]) -> BackendResult<Vec<Self::Tensor>> {
        let resolved = inputs
            .iter()
            .map(WrappedTensor::resolve)
            .collect::<BackendResult<Vec<_>>>()?;
        let outputs = match self {
            WrappedExecutable::Static(executable) => executable.call(&resolved)?,
            WrappedExecutable::Dynamic(dynamic) => dynamic.call(&resolved)?,
        };
        Ok(outputs.into_iter().map(WrappedTensor::Static).collect())
    }
}

/// Graph with dynamic shapes, compiled per input signature on first use.
///
/// Specializations live in a bounded LRU cache; an evicted signature is compiled again the
/// next time it is called.
pub struct DynamicExecutable<B: Backend> {
    inner: Arc<B>,
    graph: Graph,
    cache: Mutex<LruCache<Vec<TensorSpec>, Arc<B::Executable>>>,
}

impl<B: Backend> DynamicExecutable<B> {
    /// Number of input signatures currently specialized.
    pub fn specialization_count(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Whether a specialization for `specs` is cached.
    pub fn is_specialized(&self, specs: &[TensorSpec]) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(&specs.to_vec()))
            .unwrap_or(false)
    }

    fn call(&self, inputs: &[B::Tensor]) -> BackendResult<Vec<B::Tensor>> {
        let specs = inputs
            .iter()
            .map(|tensor| self.inner.tensor_spec(tensor))
            .collect::<BackendResult<Vec<_>>>()?;
        self.executable_for(&specs)?.call(inputs)
    }

    fn executable_for(&self, specs: &[TensorSpec]) -> BackendResult<Arc<B::Executable>> {
        let poisoned = |_| BackendError::execution("specialization cache poisoned");
        let key = specs.to_vec();
        if let Some(executable) = self.cache.lock().map_err(poisoned)?.get(&key).cloned() {
            return Ok(executable);
        }
        let specialized = specialize(&self.graph, specs)?;
        let executable = Arc::new(self.inner.compile(&specialized)?);
        debug!(
            "specialized dynamic graph for [{}]",
            specs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        let evicted = self
            .cache
            .lock()
            .map_err(poisoned)?
            .push(key, Arc::clone(&executable));
        if let Some((evicted, _)) = evicted.filter(|(evicted, _)| evicted.as_slice() != specs) {
            debug!(
                "evicted specialization for [{}]",
                evicted
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(executable)
    }
}

/// Clones `graph` with every parameter replaced by one of the concrete `specs`, then
/// re-infers all types.
pub fn specialize(graph: &Graph, specs: &[TensorSpec]) -> BackendResult<Graph> {
    let mut graph = graph.clone();
    let parameters = graph.parameters();
    if parameters.len() != specs.len() {
        return Err(BackendError::shape_mismatch(
            format!("{} input(s)", parameters.len()),
            format!("{} input(s)", specs.len()),
        ));
    }
    for (parameter, spec) in parameters.into_iter().zip(specs) {
        let (declared_type, declared_shape, friendly_name) = {
            let node = graph.try_node(parameter)?;
            (
                node.output_element_type(0)?,
                node.output_partial_shape(0)?.clone(),
                node.friendly_name().map(str::to_string),
            )
        };
        let concrete = PartialShape::from(&spec.shape);
        if declared_type.merge(spec.element_type).is_none() || !concrete.refines(&declared_shape) {
            return Err(BackendError::shape_mismatch(
                format!("{declared_type}{declared_shape}"),
                spec,
            ));
        }
        let replacement = graph.add_node(Parameter::new(spec.element_type, concrete), &[])?;
        graph.replace_node_users_arguments(parameter, replacement)?;
        if let Some(name) = friendly_name {
            graph.set_friendly_name(replacement, name)?;
        }
        graph.remove_node(parameter)?;
    }
    graph.revalidate_all()?;
    ensure_finalized(&graph)?;
    Ok(graph)
}
