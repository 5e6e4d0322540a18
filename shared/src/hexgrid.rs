//! Compact textual hex-grid descriptors
//!
//! A descriptor looks like `"<radius> <sectors> <token> <token> ..."`, with
//! whitespace or commas as separators. The radius fixes the hexagonal
//! silhouette. The sector count says how many 60° wedges the tokens describe;
//! the described wedges are then repeated by rotation `6 / sectors` times, and
//! each rotated copy is reported with its own sector index. Formations use that
//! index as the owning player, so one token stream yields a symmetric setup for
//! every player.
//!
//! ## Traversal
//!
//! Rings are visited from the outermost inward. Ring `r` is split into six sides
//! of `r` cells; side `k` starts at corner `r * DIRECTIONS[k]` and runs along
//! `DIRECTIONS[k + 2]`. For every wedge `k < sectors` and every step `i < r`
//! one token is consumed and applied to each rotated copy. The centre cell is
//! consumed last and belongs to sector 0.
//!
//! Parsing never aborts: unknown tokens, bad numbers and surplus tokens are
//! reported through [`GridVisitor::warning`] and otherwise ignored. Once the
//! token stream runs dry the remaining cells are reported as [`Token::Blank`].

/// Row/column deltas of the six neighbours, in direction order
pub const DIRECTIONS: [(i32, i32); 6] = [(-1, 1), (0, 1), (1, 0), (1, -1), (0, -1), (-1, 0)];

/// Sector count used when a descriptor omits it or gives an unusable one
pub const DEFAULT_SECTORS: u32 = 6;

/// Largest radius accepted unless the caller supplies its own limit
pub const DEFAULT_MAX_RADIUS: u32 = 16;

/// One cell code from a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `e`: nothing to place here
    Unused,
    /// `n`: playable cell, or a plain piece in a formation
    Playable,
    /// `v`: void, outside the playing area
    Void,
    /// `w`: wall
    Wall,
    /// `k`: king piece
    King,
    /// The descriptor ended before this cell was reached
    Blank,
}

impl Token {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "e" => Some(Token::Unused),
            "n" => Some(Token::Playable),
            "v" => Some(Token::Void),
            "w" => Some(Token::Wall),
            "k" => Some(Token::King),
            _ => None,
        }
    }

    /// Single-letter descriptor form, empty for [`Token::Blank`]
    pub fn code(self) -> &'static str {
        match self {
            Token::Unused => "e",
            Token::Playable => "n",
            Token::Void => "v",
            Token::Wall => "w",
            Token::King => "k",
            Token::Blank => "",
        }
    }
}

/// Receiver for the parse stream
///
/// `meta` is called exactly once, before any `cell`.
pub trait GridVisitor {
    fn meta(&mut self, radius: u32, sectors: u32);
    fn cell(&mut self, row: i32, col: i32, token: Token, sector: usize);
    fn warning(&mut self, message: String);
}

/// Whether `(row, col)` lies inside the hexagon of the given radius
pub fn in_hex(radius: u32, row: i32, col: i32) -> bool {
    let radius = radius as i32;
    row.abs() <= radius && col.abs() <= radius && (row + col).abs() <= radius
}

/// Number of cells in a hexagon of the given radius
pub fn hex_cell_count(radius: u32) -> usize {
    let radius = radius as usize;
    3 * radius * (radius + 1) + 1
}

/// Parses a descriptor with the default radius limit
pub fn parse<V: GridVisitor>(descriptor: &str, visitor: &mut V) {
    parse_with_limit(descriptor, DEFAULT_MAX_RADIUS, visitor);
}

/// Parses a descriptor, clamping the radius to `max_radius`
pub fn parse_with_limit<V: GridVisitor>(descriptor: &str, max_radius: u32, visitor: &mut V) {
    let mut words = descriptor
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty());

    let radius = match words.next().map(str::parse::<u32>) {
        Some(Ok(radius)) if radius > max_radius => {
            visitor.warning(format!(
                "Radius {} is larger than the maximum of {}",
                radius, max_radius
            ));
            max_radius
        }
        Some(Ok(radius)) => radius,
        Some(Err(_)) => {
            visitor.warning("Invalid radius".to_string());
            0
        }
        None => {
            visitor.warning("Missing radius".to_string());
            0
        }
    };

    let sectors = match words.next().map(str::parse::<u32>) {
        None => DEFAULT_SECTORS,
        Some(Ok(sectors)) if sectors > 0 && 6 % sectors == 0 => sectors,
        Some(Ok(sectors)) => {
            visitor.warning(format!("Sector count {} does not divide 6", sectors));
            DEFAULT_SECTORS
        }
        Some(Err(_)) => {
            visitor.warning("Invalid sector count".to_string());
            DEFAULT_SECTORS
        }
    };

    visitor.meta(radius, sectors);

    let sectors = sectors as usize;
    let copies = 6 / sectors;
    let radius = radius as i32;

    for ring in (1..=radius).rev() {
        for wedge in 0..sectors {
            for step in 0..ring {
                let Some(token) = next_token(&mut words, visitor) else {
                    continue;
                };
                for copy in 0..copies {
                    let side = (wedge + sectors * copy) % 6;
                    let (corner_row, corner_col) = DIRECTIONS[side];
                    let (step_row, step_col) = DIRECTIONS[(side + 2) % 6];
                    let row = ring * corner_row + step * step_row;
                    let col = ring * corner_col + step * step_col;
                    visitor.cell(row, col, token, copy);
                }
            }
        }
    }

    if let Some(token) = next_token(&mut words, visitor) {
        visitor.cell(0, 0, token, 0);
    }

    let surplus = words.count();
    if surplus > 0 {
        visitor.warning(format!("Ignoring {} surplus tokens", surplus));
    }
}

fn next_token<'a, I, V>(words: &mut I, visitor: &mut V) -> Option<Token>
where
    I: Iterator<Item = &'a str>,
    V: GridVisitor,
{
    match words.next() {
        None => Some(Token::Blank),
        Some(word) => {
            let token = Token::parse(word);
            if token.is_none() {
                visitor.warning(format!("Invalid type code \"{}\"", word));
            }
            token
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Recorder {
        meta: Vec<(u32, u32)>,
        cells: Vec<(i32, i32, Token, usize)>,
        warnings: Vec<String>,
    }

    impl GridVisitor for Recorder {
        fn meta(&mut self, radius: u32, sectors: u32) {
            assert!(self.cells.is_empty(), "meta must precede cells");
            self.meta.push((radius, sectors));
        }

        fn cell(&mut self, row: i32, col: i32, token: Token, sector: usize) {
            self.cells.push((row, col, token, sector));
        }

        fn warning(&mut self, message: String) {
            self.warnings.push(message);
        }
    }

    fn record(descriptor: &str) -> Recorder {
        let mut recorder = Recorder::default();
        parse(descriptor, &mut recorder);
        recorder
    }

    #[test]
    fn test_meta_reported_once() {
        let rec = record("3 2");
        assert_eq!(rec.meta, vec![(3, 2)]);
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn test_traversal_covers_silhouette_exactly_once() {
        for sectors in [1, 2, 3, 6] {
            for radius in 0..6 {
                let rec = record(&format!("{} {}", radius, sectors));
                let cells: HashSet<(i32, i32)> =
                    rec.cells.iter().map(|(r, c, _, _)| (*r, *c)).collect();

                assert_eq!(rec.cells.len(), hex_cell_count(radius));
                assert_eq!(cells.len(), hex_cell_count(radius));
                assert!(cells.iter().all(|(r, c)| in_hex(radius, *r, *c)));
            }
        }
    }

    #[test]
    fn test_tokens_replicated_per_sector_copy() {
        // Radius 1, three wedges per copy: tokens 0..3 cover one half of the ring.
        let rec = record("1 3 k e e");
        let kings: Vec<_> = rec
            .cells
            .iter()
            .filter(|(_, _, t, _)| *t == Token::King)
            .collect();

        assert_eq!(kings.len(), 2);
        assert_eq!((kings[0].0, kings[0].1, kings[0].3), (-1, 1, 0));
        assert_eq!((kings[1].0, kings[1].1, kings[1].3), (1, -1, 1));
    }

    #[test]
    fn test_outer_ring_visited_first() {
        let rec = record("2 6 w");
        let (row, col, token, _) = rec.cells[0];
        assert_eq!(token, Token::Wall);
        assert_eq!((row, col), (-2, 2));

        let (row, col, _, _) = *rec.cells.last().unwrap();
        assert_eq!((row, col), (0, 0));
    }

    #[test]
    fn test_blank_after_tokens_run_out() {
        let rec = record("1,6,n,n");
        let blanks = rec
            .cells
            .iter()
            .filter(|(_, _, t, _)| *t == Token::Blank)
            .count();
        assert_eq!(blanks, 5);
    }

    #[test]
    fn test_unknown_token_warns_and_is_skipped() {
        let rec = record("1 6 n x n n n n n");
        assert_eq!(rec.warnings, vec!["Invalid type code \"x\"".to_string()]);
        // The skipped position produces no cell call.
        assert_eq!(rec.cells.len(), 6);
    }

    #[test]
    fn test_surplus_tokens_warn() {
        let rec = record("0 6 n n n");
        assert_eq!(rec.cells.len(), 1);
        assert_eq!(rec.warnings, vec!["Ignoring 2 surplus tokens".to_string()]);
    }

    #[test]
    fn test_bad_sector_count_falls_back() {
        let rec = record("2 4");
        assert_eq!(rec.meta, vec![(2, DEFAULT_SECTORS)]);
        assert_eq!(rec.warnings.len(), 1);

        let rec = record("2 0");
        assert_eq!(rec.meta, vec![(2, DEFAULT_SECTORS)]);

        let rec = record("2");
        assert_eq!(rec.meta, vec![(2, DEFAULT_SECTORS)]);
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn test_bad_radius_degrades() {
        let rec = record("");
        assert_eq!(rec.meta, vec![(0, DEFAULT_SECTORS)]);
        assert_eq!(rec.warnings, vec!["Missing radius".to_string()]);

        let rec = record("big 6");
        assert_eq!(rec.meta, vec![(0, DEFAULT_SECTORS)]);
        assert_eq!(rec.cells.len(), 1);
    }

    #[test]
    fn test_radius_clamped_to_limit() {
        let mut rec = Recorder::default();
        parse_with_limit("40 6", 4, &mut rec);
        assert_eq!(rec.meta, vec![(4, 6)]);
        assert_eq!(rec.cells.len(), hex_cell_count(4));
        assert_eq!(rec.warnings.len(), 1);
    }
}
