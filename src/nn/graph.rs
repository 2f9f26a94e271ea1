use crate::error::Result;
use crate::nn::layers::Input;
use crate::nn::{Layer, Shape};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

struct LayerSlot {
    layer: RefCell<Box<dyn Layer>>,
    calls: Cell<usize>,
}

/// Shared owner of a layer inside the symbolic graph
///
/// Cloning a handle shares the layer, so calling the clone on another
/// node reuses the same weights.
#[derive(Clone)]
pub struct LayerHandle(Rc<LayerSlot>);

impl LayerHandle {
    pub fn new<L: Layer + 'static>(layer: L) -> Self {
        Self::from_box(Box::new(layer))
    }

    pub fn from_box(layer: Box<dyn Layer>) -> Self {
        LayerHandle(Rc::new(LayerSlot {
            layer: RefCell::new(layer),
            calls: Cell::new(0),
        }))
    }

    pub fn borrow(&self) -> Ref<'_, Box<dyn Layer>> {
        self.0.layer.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> RefMut<'_, Box<dyn Layer>> {
        self.0.layer.borrow_mut()
    }

    pub fn name(&self) -> Option<String> {
        self.borrow().name().map(str::to_string)
    }

    pub fn kind(&self) -> &'static str {
        self.borrow().kind()
    }

    pub fn ptr_eq(&self, other: &LayerHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Apply the layer to symbolic inputs, building it on first use
    pub fn call(&self, inputs: &[Node]) -> Result<Node> {
        let shapes: Vec<Shape> = inputs.iter().map(|n| n.shape().clone()).collect();
        let shape = {
            let mut layer = self.borrow_mut();
            let was_built = layer.is_built();
            layer.build(&shapes)?;
            if !was_built {
                tracing::debug!(
                    layer = layer.name().unwrap_or(layer.kind()),
                    ?shapes,
                    "built layer"
                );
            }
            layer.output_shape(&shapes)?
        };
        let index = self.0.calls.get();
        self.0.calls.set(index + 1);
        Ok(Node(Rc::new(NodeInner {
            layer: self.clone(),
            index,
            inputs: inputs.to_vec(),
            shape,
        })))
    }

    pub fn call_one(&self, input: &Node) -> Result<Node> {
        self.call(std::slice::from_ref(input))
    }
}

impl fmt::Debug for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layer = self.borrow();
        f.debug_struct("LayerHandle")
            .field("kind", &layer.kind())
            .field("name", &layer.name())
            .finish()
    }
}

struct NodeInner {
    layer: LayerHandle,
    index: usize,
    inputs: Vec<Node>,
    shape: Shape,
}

/// Symbolic tensor: the output of one call of a layer
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn layer(&self) -> &LayerHandle {
        &self.0.layer
    }

    /// Position of this call among all calls of its layer
    pub fn call_index(&self) -> usize {
        self.0.index
    }

    pub fn inputs(&self) -> &[Node] {
        &self.0.inputs
    }

    pub fn is_source(&self) -> bool {
        self.0.inputs.is_empty()
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("layer", &self.0.layer.name().unwrap_or_default())
            .field("index", &self.0.index)
            .field("shape", &self.0.shape)
            .finish()
    }
}

/// Create an input node of `shape`
pub fn input(shape: impl Into<Shape>) -> Result<Node> {
    LayerHandle::new(Input::new(shape)).call(&[])
}

/// Method syntax for calling an owned layer on nodes:
/// `Dense::new(10).call(&x)?`
pub trait CallLayer: Layer + Sized + 'static {
    fn call(self, input: &Node) -> Result<Node> {
        LayerHandle::new(self).call_one(input)
    }

    fn call_many(self, inputs: &[Node]) -> Result<Node> {
        LayerHandle::new(self).call(inputs)
    }

    /// Wrap in a handle for repeated calls with shared weights
    fn shared(self) -> LayerHandle {
        LayerHandle::new(self)
    }
}

impl<L: Layer + 'static> CallLayer for L {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Dense;

    #[test]
    fn shared_layer_counts_calls() {
        let a = input(vec![None, Some(4)]).unwrap();
        let b = input(vec![None, Some(4)]).unwrap();
        let dense = Dense::new(3).shared();
        let n0 = dense.call_one(&a).unwrap();
        let n1 = dense.call_one(&b).unwrap();
        assert_eq!(n0.call_index(), 0);
        assert_eq!(n1.call_index(), 1);
        assert_eq!(n1.shape(), &vec![None, Some(3)]);
        assert!(n0.layer().ptr_eq(n1.layer()));
    }

    #[test]
    fn reuse_with_wrong_width_fails() {
        let a = input(vec![None, Some(4)]).unwrap();
        let b = input(vec![None, Some(5)]).unwrap();
        let dense = Dense::new(3).shared();
        dense.call_one(&a).unwrap();
        assert!(dense.call_one(&b).is_err());
    }
}
