use nalgebra::Vector3;
use ndarray::prelude::*;
use ordered_float::OrderedFloat;

/// Maximum number of points stored in a leaf.
const LEAF_SIZE: usize = 16;

/// Spatial index answering nearest neighbor and fixed radius queries over a point set.
pub trait NearestNeighbors: Sync {
    /// Finds the closest indexed point.
    ///
    /// # Returns
    ///
    /// The index of the nearest point and its squared distance to the query,
    /// or `None` if the index is empty.
    fn nearest(&self, query: &Vector3<f32>) -> Option<(usize, f32)>;

    /// Indices of all points whose distance to the query is at most `radius`, in no particular order.
    fn radius_search(&self, query: &Vector3<f32>, radius: f32) -> Vec<usize>;
}

enum KdNode {
    Leaf {
        points: Array2<f32>,
        indices: Vec<usize>,
    },
    NonLeaf {
        axis: usize,
        middle_value: f32,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
}

/// KdTree for fast nearest neighbor search.
pub struct KdTree {
    root: Box<KdNode>,
    len: usize,
}

fn row_vector(row: ArrayView1<f32>) -> Vector3<f32> {
    Vector3::new(row[0], row[1], row[2])
}

impl KdTree {
    /// Create a new KdTree from a set of points.
    /// The points are stored in a 2D array, where each row is a point.
    /// Rows with non-finite coordinates are not indexed.
    ///
    /// # Arguments
    ///
    /// * points - Nx3 array of points.
    pub fn new(points: &ArrayView2<f32>) -> Self {
        // Recursive creation.
        fn rec(points: &ArrayView2<f32>, mut indices: Vec<usize>, depth: usize) -> KdNode {
            // Stop recursion if this should be a leaf node.
            if indices.len() <= LEAF_SIZE {
                return KdNode::Leaf {
                    points: points.select(Axis(0), &indices),
                    indices,
                };
            }

            let axis = depth % 3;
            indices.sort_by_key(|idx| OrderedFloat(points[[*idx, axis]]));

            let mid = indices.len() / 2;
            let right = indices.split_off(mid);
            KdNode::NonLeaf {
                axis,
                middle_value: points[[right[0], axis]],
                left: Box::new(rec(points, indices, depth + 1)),
                right: Box::new(rec(points, right, depth + 1)),
            }
        }

        let indices = points
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        let len = indices.len();
        KdTree {
            root: Box::new(rec(points, indices, 0)),
            len,
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn nearest_rec(node: &KdNode, query: &Vector3<f32>, best: &mut Option<(usize, f32)>) {
        match node {
            KdNode::Leaf { points, indices } => {
                for (leaf_point, idx) in points.rows().into_iter().zip(indices) {
                    let dist = (query - row_vector(leaf_point)).norm_squared();
                    // Ties keep the smallest index.
                    let is_better = match best {
                        Some((best_idx, best_dist)) => {
                            dist < *best_dist || (dist == *best_dist && *idx < *best_idx)
                        }
                        None => true,
                    };
                    if is_better {
                        *best = Some((*idx, dist));
                    }
                }
            }
            KdNode::NonLeaf {
                axis,
                middle_value,
                left,
                right,
            } => {
                let diff = query[*axis] - middle_value;
                let (near, far) = if diff < 0.0 {
                    (left, right)
                } else {
                    (right, left)
                };

                Self::nearest_rec(near, query, best);
                let must_visit_far = match best {
                    Some((_, best_dist)) => diff * diff <= *best_dist,
                    None => true,
                };
                if must_visit_far {
                    Self::nearest_rec(far, query, best);
                }
            }
        }
    }

    fn radius_rec(node: &KdNode, query: &Vector3<f32>, radius: f32, found: &mut Vec<usize>) {
        match node {
            KdNode::Leaf { points, indices } => {
                let sqr_radius = radius * radius;
                found.extend(
                    points
                        .rows()
                        .into_iter()
                        .zip(indices)
                        .filter(|(leaf_point, _)| {
                            (query - row_vector(leaf_point.view())).norm_squared() <= sqr_radius
                        })
                        .map(|(_, idx)| *idx),
                );
            }
            KdNode::NonLeaf {
                axis,
                middle_value,
                left,
                right,
            } => {
                let diff = query[*axis] - middle_value;
                if diff <= radius {
                    Self::radius_rec(left, query, radius, found);
                }
                if diff >= -radius {
                    Self::radius_rec(right, query, radius, found);
                }
            }
        }
    }

    /// Find the nearest neighbors of many query points in parallel.
    ///
    /// # Returns
    ///
    /// One entry per query row, `None` for empty trees.
    pub fn nearest_batch(&self, queries: &ArrayView2<f32>) -> Vec<Option<(usize, f32)>> {
        use rayon::prelude::*;

        (0..queries.nrows())
            .into_par_iter()
            .map(|i| self.nearest(&row_vector(queries.row(i))))
            .collect()
    }
}

impl NearestNeighbors for KdTree {
    fn nearest(&self, query: &Vector3<f32>) -> Option<(usize, f32)> {
        let mut best = None;
        Self::nearest_rec(&self.root, query, &mut best);
        best
    }

    fn radius_search(&self, query: &Vector3<f32>, radius: f32) -> Vec<usize> {
        let mut found = Vec::new();
        if radius >= 0.0 {
            Self::radius_rec(&self.root, query, radius, &mut found);
        }
        found
    }
}

/// Linear scan index, the reference the tree is tested against.
pub struct BruteForce {
    points: Array2<f32>,
}

impl BruteForce {
    pub fn new(points: &ArrayView2<f32>) -> Self {
        Self {
            points: points.to_owned(),
        }
    }
}

impl NearestNeighbors for BruteForce {
    fn nearest(&self, query: &Vector3<f32>) -> Option<(usize, f32)> {
        self.points
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(idx, row)| (idx, (query - row_vector(row)).norm_squared()))
            .min_by_key(|(idx, dist)| (OrderedFloat(*dist), *idx))
    }

    fn radius_search(&self, query: &Vector3<f32>, radius: f32) -> Vec<usize> {
        let sqr_radius = radius * radius;
        self.points
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| (query - row_vector(row.view())).norm_squared() <= sqr_radius)
            .map(|(idx, _)| idx)
            .collect()
    }
}
