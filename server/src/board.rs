//! Fixed-size grid of cells carrying territory and trail ownership

use crate::error::{CodecError, GameError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shared::{Point, Rect, SPAWN_CLEARANCE_RADIUS};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

pub type PlayerId = u32;

/// Smallest board side that still fits one spawn clearance square
pub const MIN_BOARD_DIMENSION: usize = (2 * SPAWN_CLEARANCE_RADIUS + 1) as usize;

/// One board square
///
/// `owner` marks territory, `tail` marks a trail laid by a player that is
/// currently outside its territory. The two are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cell {
    pub owner: Option<PlayerId>,
    pub tail: Option<PlayerId>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.tail.is_none()
    }
}

/// Renders `"<owner>,<tail>"` with absent ids left blank
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = self.owner {
            write!(f, "{}", owner)?;
        }
        f.write_str(",")?;
        if let Some(tail) = self.tail {
            write!(f, "{}", tail)?;
        }
        Ok(())
    }
}

impl FromStr for Cell {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, tail) = s
            .split_once(',')
            .ok_or_else(|| CodecError::Cell(s.to_string()))?;
        let parse = |field: &str| -> Result<Option<PlayerId>, CodecError> {
            if field.is_empty() {
                Ok(None)
            } else {
                field
                    .parse()
                    .map(Some)
                    .map_err(|_| CodecError::Cell(s.to_string()))
            }
        };
        Ok(Cell {
            owner: parse(owner)?,
            tail: parse(tail)?,
        })
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Row-major grid whose dimensions never change after construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Board {
    pub fn new(width: usize, height: usize) -> Result<Self, GameError> {
        if width < MIN_BOARD_DIMENSION || height < MIN_BOARD_DIMENSION {
            return Err(GameError::InvalidDimensions {
                width,
                height,
                min: MIN_BOARD_DIMENSION,
            });
        }
        Ok(Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as usize) < self.width && (p.y as usize) < self.height
    }

    pub fn get(&self, p: Point) -> Option<&Cell> {
        if self.contains(p) {
            Some(&self.cells[self.offset(p)])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width)
    }

    /// Cells in row-major order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Every coordinate paired with its cell, row-major
    pub fn iter(&self) -> impl Iterator<Item = (Point, &Cell)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (Point::new((i % width) as i32, (i / width) as i32), cell)
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Point, &mut Cell)> {
        let width = self.width;
        self.cells.iter_mut().enumerate().map(move |(i, cell)| {
            (Point::new((i % width) as i32, (i / width) as i32), cell)
        })
    }

    /// Coordinates of every cell matching `pred`
    pub fn positions<F>(&self, pred: F) -> Vec<Point>
    where
        F: Fn(&Cell) -> bool,
    {
        self.iter()
            .filter(|(_, cell)| pred(cell))
            .map(|(p, _)| p)
            .collect()
    }

    /// Sub-grid covered by `window` after clipping it to the board
    pub fn window(&self, window: Rect) -> Vec<Vec<Cell>> {
        let window = window.clip(&self.bounds());
        if window.is_empty() {
            return Vec::new();
        }
        let (x0, x1) = (window.x as usize, (window.x + window.w) as usize);
        self.rows()
            .skip(window.y as usize)
            .take(window.h as usize)
            .map(|row| row[x0..x1].to_vec())
            .collect()
    }

    fn offset(&self, p: Point) -> usize {
        p.y as usize * self.width + p.x as usize
    }
}

impl Index<Point> for Board {
    type Output = Cell;

    fn index(&self, p: Point) -> &Cell {
        debug_assert!(self.contains(p), "{:?} is off the board", p);
        &self.cells[self.offset(p)]
    }
}

impl IndexMut<Point> for Board {
    fn index_mut(&mut self, p: Point) -> &mut Cell {
        debug_assert!(self.contains(p), "{:?} is off the board", p);
        let i = self.offset(p);
        &mut self.cells[i]
    }
}
