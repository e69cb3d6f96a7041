use image::RgbaImage;

use super::Packer;
use crate::compositing::blit_extruded;
use crate::model::Rect;

type NodeId = usize;

enum NodeState {
    /// Free leaf.
    Empty,
    /// Holds an image and no space was left around it.
    Occupied { image: RgbaImage },
    /// Holds an image; the leftover space to its right and below became children.
    Split {
        image: RgbaImage,
        right: Option<NodeId>,
        left: Option<NodeId>,
    },
}

struct Node {
    /// Free area for an empty node, image footprint (content + padding) otherwise.
    bounds: Rect,
    state: NodeState,
}

/// Binary-tree bin packer over a square page.
///
/// Each placement claims the top-left corner of the first free node it fits, then splits the
/// rest of that node into a right strip (as tall as the placement) and a left area (everything
/// below it). Callers should insert in descending height order for good results.
pub struct BinaryTreePacker {
    nodes: Vec<Node>,
    padding: u32,
}

impl BinaryTreePacker {
    pub fn new(size: u32, padding: u32) -> Self {
        Self {
            nodes: vec![Node {
                bounds: Rect::new(0, 0, size, size),
                state: NodeState::Empty,
            }],
            padding,
        }
    }

    fn push(&mut self, bounds: Rect) -> NodeId {
        self.nodes.push(Node {
            bounds,
            state: NodeState::Empty,
        });
        self.nodes.len() - 1
    }

    fn insert_at(&mut self, id: NodeId, image: &mut Option<RgbaImage>) -> Option<Rect> {
        let (w, h) = match image {
            Some(img) => (img.width() + self.padding, img.height() + self.padding),
            None => return None,
        };
        let bounds = self.nodes[id].bounds;
        match self.nodes[id].state {
            NodeState::Empty => {
                if w > bounds.w || h > bounds.h {
                    return None;
                }
                let right = (bounds.w > w)
                    .then(|| self.push(Rect::new(bounds.x + w, bounds.y, bounds.w - w, h)));
                let left = (bounds.h > h)
                    .then(|| self.push(Rect::new(bounds.x, bounds.y + h, bounds.w, bounds.h - h)));
                let image = image.take()?;
                let content = Rect::new(
                    bounds.x + self.padding / 2,
                    bounds.y + self.padding / 2,
                    image.width(),
                    image.height(),
                );
                let node = &mut self.nodes[id];
                node.bounds = Rect::new(bounds.x, bounds.y, w, h);
                node.state = if right.is_none() && left.is_none() {
                    NodeState::Occupied { image }
                } else {
                    NodeState::Split { image, right, left }
                };
                Some(content)
            }
            NodeState::Occupied { .. } => None,
            NodeState::Split { right, left, .. } => right
                .and_then(|r| self.insert_at(r, image))
                .or_else(|| left.and_then(|l| self.insert_at(l, image))),
        }
    }

    fn render_at(&self, id: NodeId, canvas: &mut RgbaImage) {
        let node = &self.nodes[id];
        let (x, y) = (
            node.bounds.x + self.padding / 2,
            node.bounds.y + self.padding / 2,
        );
        let extrude = self.padding >= 2;
        match &node.state {
            NodeState::Empty => {}
            NodeState::Occupied { image } => blit_extruded(canvas, image, x, y, extrude),
            NodeState::Split { image, right, left } => {
                blit_extruded(canvas, image, x, y, extrude);
                if let Some(l) = left {
                    self.render_at(*l, canvas);
                }
                if let Some(r) = right {
                    self.render_at(*r, canvas);
                }
            }
        }
    }

    /// Number of images placed so far.
    pub fn len(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n.state, NodeState::Empty))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Packer for BinaryTreePacker {
    fn insert(&mut self, image: RgbaImage) -> Option<Rect> {
        let mut slot = Some(image);
        self.insert_at(0, &mut slot)
    }

    fn render(&self, canvas: &mut RgbaImage) {
        self.render_at(0, canvas);
    }
}
