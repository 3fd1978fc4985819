//! Boundary tracing and scanline fill for regions enclosed by a player
//!
//! A player's "solid" cells (territory plus live trail) are treated as a set
//! of polygons. The tracer walks the outer boundary of each polygon in
//! clockwise order along grid-cell edges, keeping the polygon on its right,
//! and records every vertical edge it crosses per row. Pairs of vertical
//! edges in a row delimit interior spans, so holes inside the outline are
//! part of the interior.
//!
//! Polygons are discovered in row-major scan order. Tracing stops as soon as
//! the seed cell falls inside a traced outline, and the interior of every
//! outline traced so far is returned.

use crate::board::{Board, Cell};
use shared::{insert_sorted, Point};

/// Interior cells of the outlines traced up to and including the one that
/// encloses `seed`
///
/// `solid` decides which cells form the polygons. The result includes the
/// solid cells themselves; callers filter what they do not want. Returns an
/// empty list when no outline encloses `seed`.
pub fn enclosed_cells<F>(board: &Board, solid: F, seed: Point) -> Vec<Point>
where
    F: Fn(&Cell) -> bool,
{
    let mut tracer = Tracer::new(board, solid);

    for y in 0..board.height() as i32 {
        for x in 0..board.width() as i32 {
            if tracer.is_solid(x, y) {
                tracer.trace_outline(Point::new(x, y));
                if !tracer.is_solid(seed.x, seed.y) {
                    return tracer.edges.interior();
                }
            }
        }
    }

    Vec::new()
}

/// Sorted x positions of vertical polygon edges, one list per row
struct EdgeTable {
    rows: Vec<Vec<i32>>,
}

impl EdgeTable {
    fn new(height: usize) -> Self {
        Self {
            rows: vec![Vec::new(); height],
        }
    }

    fn insert(&mut self, x: i32, y: i32) {
        if let Some(row) = self.rows.get_mut(y as usize) {
            insert_sorted(row, x);
        }
    }

    /// Whether (x, y) lies inside an outline already committed to the table
    fn covers(&self, x: i32, y: i32) -> bool {
        let Some(row) = self.rows.get(y as usize) else {
            return false;
        };
        for span in row.chunks_exact(2) {
            if x >= span[0] && x < span[1] {
                return true;
            }
            if x < span[1] {
                break;
            }
        }
        false
    }

    fn interior(&self) -> Vec<Point> {
        let mut cells = Vec::new();
        for (y, row) in self.rows.iter().enumerate() {
            for span in row.chunks_exact(2) {
                cells.extend((span[0]..span[1]).map(|x| Point::new(x, y as i32)));
            }
        }
        cells
    }
}

struct Tracer<'a, F> {
    board: &'a Board,
    solid: F,
    edges: EdgeTable,
}

impl<'a, F> Tracer<'a, F>
where
    F: Fn(&Cell) -> bool,
{
    fn new(board: &'a Board, solid: F) -> Self {
        Self {
            board,
            solid,
            edges: EdgeTable::new(board.height()),
        }
    }

    /// Solid and not already swallowed by a committed outline
    fn is_solid(&self, x: i32, y: i32) -> bool {
        match self.board.get(Point::new(x, y)) {
            Some(cell) => (self.solid)(cell) && !self.edges.covers(x, y),
            None => false,
        }
    }

    /// The edge leaving vertex `pos` along `dir` is on the outline when the
    /// cell on its right is solid and the cell on its left is not
    fn is_outline_edge(&self, pos: Point, dir: Point) -> bool {
        let (inside, outside) = match (dir.x, dir.y) {
            (1, 0) => ((pos.x, pos.y), (pos.x, pos.y - 1)),
            (0, 1) => ((pos.x - 1, pos.y), (pos.x, pos.y)),
            (-1, 0) => ((pos.x - 1, pos.y - 1), (pos.x - 1, pos.y)),
            (0, -1) => ((pos.x, pos.y - 1), (pos.x - 1, pos.y - 1)),
            _ => return false,
        };
        self.is_solid(inside.0, inside.1) && !self.is_solid(outside.0, outside.1)
    }

    /// Walks the outline starting at the top-left vertex of `start` and
    /// commits its vertical edges once the loop closes
    fn trace_outline(&mut self, start: Point) {
        // Vertices are cell top-left corners; an outline has at most four
        // edges per cell.
        let max_steps = 4 * self.board.area() + 4;
        let mut pos = start;
        let mut dir = Point::new(1, 0);
        let mut pending = Vec::new();

        for _ in 0..max_steps {
            let mut turns = 0;
            while !self.is_outline_edge(pos, dir) {
                dir = Point::new(-dir.y, dir.x);
                turns += 1;
                if turns == 4 {
                    // Isolated vertex; nothing to walk.
                    return;
                }
            }

            match dir.y {
                1 => pending.push((pos.x, pos.y)),
                -1 => pending.push((pos.x, pos.y - 1)),
                _ => {}
            }

            pos = Point::new(pos.x + dir.x, pos.y + dir.y);
            if pos == start {
                break;
            }
        }

        for (x, y) in pending {
            self.edges.insert(x, y);
        }
    }
}
