use core::ops::Range;

use umbra_geom::{Aabb, Vec3};

use crate::Light;

/// Node of a [`LightBvh`].
///
/// `first` is the left child index for internal nodes (the right child follows
/// it) and the offset into the index permutation for leaves. A node is a leaf
/// iff `count > 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    first: u32,
    count: u32,
}

impl BvhNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    /// Left child; the right child is `left + 1`.
    #[inline]
    pub fn left_child(&self) -> Option<usize> {
        if self.is_leaf() { None } else { Some(self.first as usize) }
    }

    /// Range into [`LightBvh::indices`] for a leaf, empty for internal nodes.
    #[inline]
    pub fn light_range(&self) -> Range<usize> {
        if self.is_leaf() {
            self.first as usize..(self.first + self.count) as usize
        } else {
            0..0
        }
    }
}

/// Binary midpoint-split tree over light influence spheres.
pub struct LightBvh {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
}

const LEAF_MAX: u32 = 2;

impl LightBvh {
    pub fn build(lights: &[Light]) -> Self {
        let count = lights.len() as u32;
        let mut bvh = Self {
            nodes: Vec::with_capacity((lights.len() * 2).max(1)),
            indices: (0..count).collect(),
        };
        bvh.nodes.push(BvhNode {
            bounds: Aabb::EMPTY,
            first: 0,
            count,
        });
        if count == 0 {
            return bvh;
        }
        bvh.refit(0, lights);

        let mut work = vec![0usize];
        while let Some(idx) = work.pop() {
            if let Some(left) = bvh.split(idx, lights) {
                bvh.refit(left, lights);
                bvh.refit(left + 1, lights);
                work.push(left + 1);
                work.push(left);
            }
        }
        log::debug!(
            target: "bvh",
            "built light bvh: {} lights, {} nodes",
            lights.len(),
            bvh.nodes.len()
        );
        bvh
    }

    /// Partition a leaf in place around the midpoint of its largest axis.
    /// Returns the new left child index, or `None` if the node stays a leaf.
    fn split(&mut self, idx: usize, lights: &[Light]) -> Option<usize> {
        let node = self.nodes[idx];
        if node.count <= LEAF_MAX {
            return None;
        }
        let axis = node.bounds.largest_axis();
        let plane = node.bounds.min[axis] + node.bounds.extent()[axis] * 0.5;

        let mut i = node.first as usize;
        let mut j = (node.first + node.count) as usize;
        while i < j {
            if lights[self.indices[i] as usize].position[axis] < plane {
                i += 1;
            } else {
                j -= 1;
                self.indices.swap(i, j);
            }
        }

        let left_count = i as u32 - node.first;
        // Coincident centers: every light lands on one side
        if left_count == 0 || left_count == node.count {
            return None;
        }

        let left = self.nodes.len();
        self.nodes.push(BvhNode {
            bounds: Aabb::EMPTY,
            first: node.first,
            count: left_count,
        });
        self.nodes.push(BvhNode {
            bounds: Aabb::EMPTY,
            first: i as u32,
            count: node.count - left_count,
        });
        self.nodes[idx].first = left as u32;
        self.nodes[idx].count = 0;
        Some(left)
    }

    fn refit(&mut self, idx: usize, lights: &[Light]) {
        let range = self.nodes[idx].light_range();
        let mut bounds = Aabb::EMPTY;
        for &li in &self.indices[range] {
            bounds.encapsulate(&lights[li as usize].bounds());
        }
        self.nodes[idx].bounds = bounds;
    }

    #[inline]
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Collect the lights of every leaf whose box contains `point`.
    ///
    /// The result is a candidate set: leaf boxes enclose whole spheres, so
    /// callers still test each light's radius.
    pub fn query_overlapping(&self, point: Vec3, out: &mut Vec<u32>) {
        out.clear();
        self.visit_leaves(point, |node| {
            out.extend_from_slice(&self.indices[node.light_range()]);
        });
    }

    /// Bounding boxes of the leaves reached by `point`, for debug drawing.
    pub fn query_leaf_bounds(&self, point: Vec3) -> Vec<Aabb> {
        let mut boxes = Vec::new();
        self.visit_leaves(point, |node| boxes.push(node.bounds));
        boxes
    }

    fn visit_leaves<F: FnMut(&BvhNode)>(&self, point: Vec3, mut f: F) {
        if self.is_empty() || !self.nodes[0].bounds.contains_point(point) {
            return;
        }
        let mut stack: Vec<usize> = Vec::with_capacity(32);
        stack.push(0);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            match node.left_child() {
                None => f(node),
                Some(left) => {
                    for child in [left + 1, left] {
                        if self.nodes[child].bounds.contains_point(point) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
    }
}
