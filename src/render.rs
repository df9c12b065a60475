//! Render queue composition.
//!
//! Scene traversal does not draw anything itself. Every visited object is
//! handed to a [`RenderManager`] together with its queue id and order key; the
//! manager decides what happens next. [`RenderQueue`] is the stock manager: it
//! buckets submissions by queue id and sorts each bucket by order key.
//!
//! # Queue ids
//!
//! - [`BACKGROUND_QUEUE`] holds cameras, lights and render targets
//! - [`GEOMETRY_QUEUE`] is the default for scene objects
//! - [`OVERLAY_QUEUE`] holds vector graphics drawn on top
//!
//! Queues are processed in ascending id order, so any id can be used to slot
//! custom passes in between.

use std::{collections::BTreeMap, fmt, rc::Rc};

use crate::objects::Renderable;

pub const BACKGROUND_QUEUE: u32 = 0;
pub const GEOMETRY_QUEUE: u32 = 50;
pub const OVERLAY_QUEUE: u32 = 100;

/// Receives the objects a traversal wants drawn.
pub trait RenderManager {
    fn add_renderable_to_queue(&mut self, queue: u32, order: i32, renderable: Rc<dyn Renderable>);
}

#[derive(Clone)]
pub struct QueueEntry {
    pub order: i32,
    pub sequence: usize,
    pub renderable: Rc<dyn Renderable>,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .field("renderable", &self.renderable.name())
            .finish()
    }
}

/// Ordered buckets of renderables for one frame.
#[derive(Debug, Default)]
pub struct RenderQueue {
    queues: BTreeMap<u32, Vec<QueueEntry>>,
    submitted: usize,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort every bucket by order key. Equal keys keep submission order.
    pub fn sort(&mut self) {
        for entries in self.queues.values_mut() {
            entries.sort_by_key(|e| (e.order, e.sequence));
        }
    }

    /// All entries, queue by queue in ascending id.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &QueueEntry)> + '_ {
        self.queues
            .iter()
            .flat_map(|(queue, entries)| entries.iter().map(move |e| (*queue, e)))
    }

    pub fn queue(&self, queue: u32) -> &[QueueEntry] {
        self.queues.get(&queue).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names in processing order, handy for inspection.
    pub fn names(&self) -> Vec<String> {
        self.iter()
            .map(|(_, e)| e.renderable.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.queues.clear();
        self.submitted = 0;
    }
}

impl RenderManager for RenderQueue {
    fn add_renderable_to_queue(&mut self, queue: u32, order: i32, renderable: Rc<dyn Renderable>) {
        log::trace!("queue {}: `{}` at {}", queue, renderable.name(), order);
        self.queues.entry(queue).or_default().push(QueueEntry {
            order,
            sequence: self.submitted,
            renderable,
        });
        self.submitted += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::attribute_set::{AttributeSet, DrawMode},
        objects::scene_object::SceneObject,
    };

    fn object(name: &str, queue: u32, order: i32) -> Rc<dyn Renderable> {
        Rc::new(
            SceneObject::new(name, queue, AttributeSet::new(DrawMode::Points, false, false, false))
                .with_order(order),
        )
    }

    #[test]
    fn buckets_are_processed_in_queue_order() {
        let mut queue = RenderQueue::new();
        for o in [
            object("hud", OVERLAY_QUEUE, 0),
            object("mesh", GEOMETRY_QUEUE, 0),
            object("sky", BACKGROUND_QUEUE, 0),
        ] {
            queue.add_renderable_to_queue(o.queue(), o.order(), o);
        }
        assert_eq!(queue.names(), ["sky", "mesh", "hud"]);
        assert_eq!(queue.queue(GEOMETRY_QUEUE).len(), 1);
        assert!(queue.queue(7).is_empty());
    }

    #[test]
    fn sort_is_stable_within_a_bucket() {
        let mut queue = RenderQueue::new();
        for (name, order) in [("b", 2), ("a1", 1), ("c", 3), ("a2", 1)] {
            queue.add_renderable_to_queue(GEOMETRY_QUEUE, order, object(name, GEOMETRY_QUEUE, order));
        }
        queue.sort();
        assert_eq!(queue.names(), ["a1", "a2", "b", "c"]);
        queue.clear();
        assert!(queue.is_empty());
    }
}
