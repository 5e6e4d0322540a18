//! Hex board storage
//!
//! Cells live in a square array of side `diam = 2 * radius + 1`, addressed by a
//! linear index `(row + radius) * diam + (col + radius)`. Cells of the square
//! that fall outside the hexagon stay [`Cell::Edge`].

use crate::hexgrid::DIRECTIONS;
use serde::{Deserialize, Serialize};

/// Stable piece identifier, never reused within one game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Edge,
    Wall,
    Occupied(PieceId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    radius: u32,
    diam: usize,
    cells: Vec<Cell>,
    neighbor_offsets: [isize; 6],
}

impl Board {
    /// Creates an Edge-filled board covering a hexagon of `radius`
    pub fn new(radius: u32) -> Self {
        let diam = radius as usize * 2 + 1;
        let d = diam as isize;
        Self {
            radius,
            diam,
            cells: vec![Cell::Edge; diam * diam],
            neighbor_offsets: [-d + 1, 1, d, d - 1, -1, -d],
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn diameter(&self) -> usize {
        self.diam
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Index offsets of the six neighbours for this board's diameter
    pub fn neighbor_offsets(&self) -> [isize; 6] {
        self.neighbor_offsets
    }

    /// Linear index of `(row, col)`, or `None` outside the square array
    pub fn loc(&self, row: i32, col: i32) -> Option<usize> {
        let r = self.radius as i32;
        if row.abs() > r || col.abs() > r {
            return None;
        }
        Some((row + r) as usize * self.diam + (col + r) as usize)
    }

    pub fn coords(&self, loc: usize) -> (i32, i32) {
        let r = self.radius as i32;
        ((loc / self.diam) as i32 - r, (loc % self.diam) as i32 - r)
    }

    /// Cell at `loc`; anything off the array reads as Edge
    pub fn get(&self, loc: usize) -> Cell {
        self.cells.get(loc).copied().unwrap_or(Cell::Edge)
    }

    pub fn set(&mut self, loc: usize, cell: Cell) {
        if let Some(slot) = self.cells.get_mut(loc) {
            *slot = cell;
        }
    }

    pub fn piece_at(&self, loc: usize) -> Option<PieceId> {
        match self.get(loc) {
            Cell::Occupied(id) => Some(id),
            _ => None,
        }
    }

    /// Neighbour of `loc` in direction `dir` (taken modulo 6)
    ///
    /// Returns `None` when the step leaves the square array, including steps
    /// that would wrap from one row's end into the next row.
    pub fn neighbor(&self, loc: usize, dir: usize) -> Option<usize> {
        if loc >= self.cells.len() {
            return None;
        }
        let dir = dir % 6;
        let (row, col) = self.coords(loc);
        let (dr, dc) = DIRECTIONS[dir];
        self.loc(row + dr, col + dc)?;
        Some((loc as isize + self.neighbor_offsets[dir]) as usize)
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::new(0)
    }
}
