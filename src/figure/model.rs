//! Shape and visibility state for one figure instance, with typed change
//! events.
//!
//! The model is owned by the scene-composition layer, which decides what a
//! figure looks like and whether it is shown. Providers subscribe at load
//! time and drain their event channel once per frame; subscriptions live
//! for the provider's whole lifetime.

use std::sync::mpsc;
use std::sync::Arc;

use crate::assets::ArtifactDirectory;

/// A selected body/garment shape. A shape may ship its own baked occlusion
/// directory; when it does not, the figure's default directory is used.
#[derive(Clone)]
pub struct Shape {
    /// Shape name.
    pub name: String,
    /// Occlusion data baked for this shape, if any.
    pub occlusion_directory: Option<Arc<dyn ArtifactDirectory>>,
}

impl Shape {
    /// The unmorphed default shape (no dedicated occlusion directory).
    #[must_use]
    pub fn default_shape() -> Self {
        Self {
            name: "default".to_owned(),
            occlusion_directory: None,
        }
    }
}

/// A change to a figure model, broadcast to subscribed providers.
#[derive(Clone)]
pub enum ModelEvent {
    /// The shape (and possibly its occlusion directory) changed.
    ShapeChanged(Shape),
    /// The visibility flag changed.
    VisibilityChanged(bool),
}

/// Mutable per-figure-instance state: current shape and visibility.
pub struct FigureModel {
    shape: Shape,
    visible: bool,
    subscribers: Vec<mpsc::Sender<ModelEvent>>,
}

impl FigureModel {
    /// A model starting with the given shape and visibility.
    #[must_use]
    pub fn new(shape: Shape, visible: bool) -> Self {
        Self {
            shape,
            visible,
            subscribers: Vec::new(),
        }
    }

    /// Current shape.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Current visibility.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Subscribe to subsequent change events.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ModelEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Replace the shape and notify subscribers.
    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape.clone();
        self.broadcast(&ModelEvent::ShapeChanged(shape));
    }

    /// Set visibility and notify subscribers.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.broadcast(&ModelEvent::VisibilityChanged(visible));
    }

    /// Send to all live subscribers, pruning disconnected ones.
    fn broadcast(&mut self, event: &ModelEvent) {
        self.subscribers
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_changes() {
        let mut model = FigureModel::new(Shape::default_shape(), true);
        let receiver = model.subscribe();
        model.set_visible(false);
        let event = receiver.try_recv();
        assert!(matches!(event, Ok(ModelEvent::VisibilityChanged(false))));
        assert!(!model.is_visible());
    }

    #[test]
    fn shape_change_carries_the_new_shape() {
        let mut model = FigureModel::new(Shape::default_shape(), true);
        let receiver = model.subscribe();
        model.set_shape(Shape {
            name: "athletic".to_owned(),
            occlusion_directory: None,
        });
        match receiver.try_recv() {
            Ok(ModelEvent::ShapeChanged(shape)) => {
                assert_eq!(shape.name, "athletic");
            }
            _ => unreachable!("expected a shape change event"),
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut model = FigureModel::new(Shape::default_shape(), true);
        drop(model.subscribe());
        let live = model.subscribe();
        model.set_visible(false);
        assert_eq!(model.subscribers.len(), 1);
        drop(live);
    }
}
