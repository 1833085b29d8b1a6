//! Chunked index over static wall rectangles.
//!
//! Walls are bucketed by the chunk containing their top-left corner. Range
//! queries return every wall of every touched chunk, a conservative superset
//! that callers narrow down with an exact AABB test.

use std::collections::HashMap;

use crate::util::geometry::Rect;

/// Chunk coordinates `(floor(x / size), floor(y / size))`
pub type ChunkKey = (i32, i32);

#[derive(Debug, Clone, Default)]
pub struct WallIndex {
    chunk_size: f32,
    chunks: HashMap<ChunkKey, Vec<Rect>>,
    walls: Vec<Rect>,
    /// Largest wall width/height; queries reach this far back so walls
    /// anchored in a neighbouring chunk are still found
    max_extent: f32,
}

impl WallIndex {
    /// Group every wall by its chunk key.
    ///
    /// A non-positive or non-finite chunk size leaves the index unbucketed,
    /// in which case queries fall back to the full wall list.
    pub fn build(walls: Vec<Rect>, chunk_size: f32) -> Self {
        let mut chunks: HashMap<ChunkKey, Vec<Rect>> = HashMap::new();
        let mut max_extent: f32 = 0.0;
        let bucketed = chunk_size.is_finite() && chunk_size > 0.0;

        for wall in &walls {
            max_extent = max_extent.max(wall.width).max(wall.height);
            if bucketed {
                let key = Self::key_for(wall.x, wall.y, chunk_size);
                chunks.entry(key).or_default().push(*wall);
            }
        }

        Self {
            chunk_size,
            chunks,
            walls,
            max_extent,
        }
    }

    #[inline]
    fn key_for(x: f32, y: f32, chunk_size: f32) -> ChunkKey {
        ((x / chunk_size).floor() as i32, (y / chunk_size).floor() as i32)
    }

    pub fn walls(&self) -> &[Rect] {
        &self.walls
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Candidate walls near `rect` expanded by `pad` on all sides
    pub fn query_near(&self, rect: &Rect, pad: f32) -> Vec<&Rect> {
        let finite = rect.x.is_finite()
            && rect.y.is_finite()
            && rect.width.is_finite()
            && rect.height.is_finite()
            && pad.is_finite();

        if self.chunks.is_empty() || !finite {
            return self.walls.iter().collect();
        }

        let reach = pad + self.max_extent;
        let (start_cx, start_cy) = Self::key_for(rect.x - reach, rect.y - reach, self.chunk_size);
        let (end_cx, end_cy) = Self::key_for(
            rect.x + rect.width + pad,
            rect.y + rect.height + pad,
            self.chunk_size,
        );

        let span = (i64::from(end_cx) - i64::from(start_cx) + 1).max(0)
            * (i64::from(end_cy) - i64::from(start_cy) + 1).max(0);

        // Huge query windows scan the occupied chunks instead of the key range
        if span > self.chunks.len() as i64 {
            return self
                .chunks
                .iter()
                .filter(|((cx, cy), _)| {
                    (start_cx..=end_cx).contains(cx) && (start_cy..=end_cy).contains(cy)
                })
                .flat_map(|(_, walls)| walls.iter())
                .collect();
        }

        let mut found = Vec::new();
        for cy in start_cy..=end_cy {
            for cx in start_cx..=end_cx {
                if let Some(walls) = self.chunks.get(&(cx, cy)) {
                    found.extend(walls.iter());
                }
            }
        }
        found
    }

    /// Exact test: does `rect` overlap any wall
    pub fn collides(&self, rect: &Rect, pad: f32) -> bool {
        self.query_near(rect, pad).into_iter().any(|wall| wall.overlaps(rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: f32, y: f32) -> Rect {
        Rect::new(x, y, 50.0, 50.0)
    }

    #[test]
    fn walls_grouped_by_top_left_chunk() {
        let walls = vec![tile(0.0, 0.0), tile(150.0, 0.0), tile(200.0, 400.0)];
        let index = WallIndex::build(walls, 200.0);
        assert_eq!(index.chunk_count(), 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn query_only_touches_nearby_chunks() {
        let index = WallIndex::build(vec![tile(0.0, 0.0), tile(1000.0, 1000.0)], 200.0);
        let near = index.query_near(&Rect::new(10.0, 10.0, 20.0, 20.0), 10.0);
        assert_eq!(near.len(), 1);
        assert_eq!(*near[0], tile(0.0, 0.0));
    }

    #[test]
    fn wall_anchored_in_previous_chunk_is_found() {
        // Wall starts in chunk (0,0) but reaches into chunk (1,0)
        let index = WallIndex::build(vec![Rect::new(190.0, 10.0, 50.0, 50.0)], 200.0);
        let query = Rect::new(225.0, 20.0, 5.0, 5.0);
        assert!(index.collides(&query, 0.0));
    }

    #[test]
    fn query_is_superset_of_exact_hits() {
        let walls: Vec<Rect> = (0..24)
            .flat_map(|i| [tile(i as f32 * 50.0, 0.0), tile(0.0, i as f32 * 50.0)])
            .collect();
        let index = WallIndex::build(walls.clone(), 200.0);
        let query = Rect::new(30.0, 420.0, 46.0, 46.0);
        let exact = walls.iter().filter(|w| w.overlaps(&query)).count();
        let candidates = index.query_near(&query, 10.0);
        assert_eq!(candidates.iter().filter(|w| w.overlaps(&query)).count(), exact);
        assert!(exact > 0);
    }

    #[test]
    fn unbucketed_index_falls_back_to_all_walls() {
        let index = WallIndex::build(vec![tile(0.0, 0.0), tile(1000.0, 1000.0)], 0.0);
        assert_eq!(index.chunk_count(), 0);
        assert_eq!(index.query_near(&Rect::new(0.0, 0.0, 1.0, 1.0), 0.0).len(), 2);
    }

    #[test]
    fn non_finite_query_returns_everything() {
        let index = WallIndex::build(vec![tile(0.0, 0.0), tile(1000.0, 1000.0)], 200.0);
        let r = Rect::new(f32::NAN, 0.0, 10.0, 10.0);
        assert_eq!(index.query_near(&r, 10.0).len(), 2);
    }

    #[test]
    fn huge_window_scans_occupied_chunks() {
        let index = WallIndex::build(vec![tile(0.0, 0.0), tile(1000.0, 1000.0)], 200.0);
        let r = Rect::new(-1.0e6, -1.0e6, 2.0e6, 2.0e6);
        assert_eq!(index.query_near(&r, 0.0).len(), 2);
    }
}
