//! Go position representation and incremental move execution.
//!
//! The board is a dense array of 361 intersections plus a single ko
//! point. Every successful [`Board::play`] returns an [`Undo`] snapshot
//! that reverses it exactly; snapshots must be applied in strict LIFO
//! order per board instance. On top of the raw position the module
//! provides the derived maps the input builder needs: per-group liberty
//! counts (capped at 3) and the Chinese-rules area map.

use std::fmt;
use std::sync::OnceLock;

use crate::constants::{N, NUM_POINTS};

/// A point on the board: a dense index `0..361`, or [`PASS`].
pub type Point = u16;

/// The pass move.
pub const PASS: Point = NUM_POINTS as Point;

/// A player.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Player {
    Black,
    White,
}

impl Player {
    /// The other player.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::Black => Player::White,
            Player::White => Player::Black,
        }
    }

    /// +1 for Black, -1 for White. Black-perspective quantities are
    /// multiplied by this to convert to this player's perspective.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Player::Black => 1.0,
            Player::White => -1.0,
        }
    }
}

/// State of one intersection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointState {
    Empty,
    Stone(Player),
}

/// Scoring rule set. Only the properties the input features care about
/// are distinguished: territory scoring and the area planes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rules {
    Japanese,
    Chinese,
    Korean,
}

impl Rules {
    /// Territory scoring (as opposed to area scoring).
    #[inline]
    pub fn is_territory_scoring(self) -> bool {
        matches!(self, Rules::Japanese | Rules::Korean)
    }

    /// Whether the area planes are filled.
    #[inline]
    pub fn uses_area_features(self) -> bool {
        matches!(self, Rules::Chinese)
    }
}

/// One entry of the move history, most-recent-last.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecentMove {
    pub mv: Point,
    pub player: Player,
}

/// Result of attempting to play a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// Point is not empty.
    #[error("point is not empty")]
    Occupied,
    /// Move retakes the ko.
    #[error("move retakes the ko")]
    Ko,
    /// Move would leave its own group without liberties.
    #[error("move would be suicide")]
    Suicide,
    /// A constructed position contains a group with no liberties.
    #[error("group with no liberties at point {point}")]
    DeadGroup { point: Point },
    /// A constructed position marks a non-empty point as the ko point.
    #[error("ko point {point} is not empty")]
    BadKoPoint { point: Point },
}

// =============================================================================
// Neighbor Table
// =============================================================================

/// Precomputed orthogonal neighbors: per-point ranges into a flat array
/// (corner = 2, edge = 3, interior = 4 entries).
struct NeighborTable {
    start: [u16; NUM_POINTS + 1],
    flat: Vec<Point>,
}

static NEIGHBORS: OnceLock<NeighborTable> = OnceLock::new();

fn neighbor_table() -> &'static NeighborTable {
    NEIGHBORS.get_or_init(|| {
        let mut start = [0u16; NUM_POINTS + 1];
        let mut flat = Vec::with_capacity(4 * NUM_POINTS);
        for p in 0..NUM_POINTS {
            start[p] = flat.len() as u16;
            let (x, y) = (p % N, p / N);
            if y > 0 {
                flat.push((p - N) as Point);
            }
            if x > 0 {
                flat.push((p - 1) as Point);
            }
            if x + 1 < N {
                flat.push((p + 1) as Point);
            }
            if y + 1 < N {
                flat.push((p + N) as Point);
            }
        }
        start[NUM_POINTS] = flat.len() as u16;
        NeighborTable { start, flat }
    })
}

/// The orthogonal neighbors of a point.
#[inline]
pub fn neighbors(p: Point) -> &'static [Point] {
    let t = neighbor_table();
    let lo = t.start[p as usize] as usize;
    let hi = t.start[p as usize + 1] as usize;
    &t.flat[lo..hi]
}

// =============================================================================
// Undo Snapshot
// =============================================================================

/// Everything needed to reverse one [`Board::play`].
///
/// For a pass this only records the prior ko point. Snapshots must be
/// consumed in reverse order of the plays that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Undo {
    prev_ko: Option<Point>,
    captured: Vec<Point>,
}

impl Undo {
    /// Opponent stones removed by the move this snapshot reverses.
    pub fn captured(&self) -> &[Point] {
        &self.captured
    }
}

// =============================================================================
// Board
// =============================================================================

/// A Go position: 361 intersections and the simple-ko point.
///
/// After any successful [`play`](Board::play) no group on the board has
/// zero liberties; illegal moves are rejected before mutation.
#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    stones: [PointState; NUM_POINTS],
    ko: Option<Point>,
}

impl Board {
    /// The empty position.
    pub fn empty() -> Self {
        Board {
            stones: [PointState::Empty; NUM_POINTS],
            ko: None,
        }
    }

    /// Build a position from a raw stones array, validating that every
    /// group has at least one liberty and that the ko point is empty.
    pub fn from_stones(
        stones: [PointState; NUM_POINTS],
        ko: Option<Point>,
    ) -> Result<Self, MoveError> {
        let board = Board { stones, ko };
        if let Some(k) = ko {
            if k >= PASS || board.stones[k as usize] != PointState::Empty {
                return Err(MoveError::BadKoPoint { point: k });
            }
        }
        let mut seen = [false; NUM_POINTS];
        for p in 0..NUM_POINTS as Point {
            if seen[p as usize] || board.stones[p as usize] == PointState::Empty {
                continue;
            }
            let mut group = Vec::new();
            board.collect_group(p, &mut group);
            for &s in &group {
                seen[s as usize] = true;
            }
            if board.group_liberties_upto(p, 1) == 0 {
                return Err(MoveError::DeadGroup { point: p });
            }
        }
        Ok(board)
    }

    /// The state of one intersection.
    #[inline]
    pub fn stone_at(&self, p: Point) -> PointState {
        self.stones[p as usize]
    }

    /// The raw stones array.
    #[inline]
    pub fn stones(&self) -> &[PointState; NUM_POINTS] {
        &self.stones
    }

    /// The current ko point, if any.
    #[inline]
    pub fn ko(&self) -> Option<Point> {
        self.ko
    }

    /// Play a move for `player`, resolving captures, simple ko and
    /// suicide. On success the returned snapshot reverses the move via
    /// [`undo`](Board::undo); on failure the board is unchanged.
    ///
    /// # Errors
    /// - [`MoveError::Occupied`] if the point holds a stone
    /// - [`MoveError::Ko`] if the point is the ko point
    /// - [`MoveError::Suicide`] if the group would end with no liberties
    pub fn play(&mut self, mv: Point, player: Player) -> Result<Undo, MoveError> {
        let prev_ko = self.ko;
        if mv == PASS {
            self.ko = None;
            return Ok(Undo {
                prev_ko,
                captured: Vec::new(),
            });
        }
        let p = mv as usize;
        if self.stones[p] != PointState::Empty {
            return Err(MoveError::Occupied);
        }
        if self.ko == Some(mv) {
            return Err(MoveError::Ko);
        }

        let opp = player.opponent();
        self.stones[p] = PointState::Stone(player);

        // Only groups adjacent to the new stone can have died.
        let mut captured = Vec::new();
        for &n in neighbors(mv) {
            if self.stones[n as usize] == PointState::Stone(opp)
                && self.group_liberties_upto(n, 1) == 0
            {
                self.remove_group(n, &mut captured);
            }
        }

        if captured.is_empty() && self.group_liberties_upto(mv, 1) == 0 {
            self.stones[p] = PointState::Empty;
            return Err(MoveError::Suicide);
        }

        // Simple ko: a lone stone that captured exactly one stone and
        // now has exactly one liberty (the point it captured).
        self.ko = None;
        if captured.len() == 1 {
            let mut alone = true;
            let mut libs = 0;
            for &n in neighbors(mv) {
                match self.stones[n as usize] {
                    PointState::Empty => libs += 1,
                    PointState::Stone(c) if c == player => alone = false,
                    PointState::Stone(_) => {}
                }
            }
            if alone && libs == 1 {
                self.ko = Some(captured[0]);
            }
        }

        Ok(Undo { prev_ko, captured })
    }

    /// Reverse a move played by `player`. Must be called in strict
    /// reverse order of the plays on this board.
    pub fn undo(&mut self, mv: Point, player: Player, undo: Undo) {
        self.ko = undo.prev_ko;
        if mv != PASS {
            self.stones[mv as usize] = PointState::Empty;
            let opp = player.opponent();
            for &c in &undo.captured {
                self.stones[c as usize] = PointState::Stone(opp);
            }
        }
    }

    /// Cheap legality test used when enumerating candidate moves: the
    /// point is empty, not the ko point, and has an empty neighbor, or
    /// captures an adjacent opponent group, or connects to a friendly
    /// group that keeps a liberty. Accepts every strictly legal move
    /// and a few positions that [`play`](Board::play) would still
    /// reject as suicide after capture resolution.
    pub fn is_plausibly_legal(&self, mv: Point, player: Player) -> bool {
        if mv == PASS {
            return true;
        }
        if self.stones[mv as usize] != PointState::Empty || self.ko == Some(mv) {
            return false;
        }
        for &n in neighbors(mv) {
            match self.stones[n as usize] {
                PointState::Empty => return true,
                PointState::Stone(c) if c == player => {
                    if self.group_liberties_upto(n, 2) >= 2 {
                        return true;
                    }
                }
                PointState::Stone(_) => {
                    if self.group_liberties_upto(n, 2) == 1 {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Count the liberties of the group at `start`, stopping early once
    /// `cap` distinct liberties are found. `start` must hold a stone.
    pub fn group_liberties_upto(&self, start: Point, cap: u32) -> u32 {
        let color = self.stones[start as usize];
        debug_assert!(color != PointState::Empty);
        let mut visited = [false; NUM_POINTS];
        let mut lib_seen = [false; NUM_POINTS];
        let mut stack = vec![start];
        visited[start as usize] = true;
        let mut libs = 0;

        while let Some(pt) = stack.pop() {
            for &n in neighbors(pt) {
                let ni = n as usize;
                match self.stones[ni] {
                    PointState::Empty => {
                        if !lib_seen[ni] {
                            lib_seen[ni] = true;
                            libs += 1;
                            if libs >= cap {
                                return libs;
                            }
                        }
                    }
                    c if c == color => {
                        if !visited[ni] {
                            visited[ni] = true;
                            stack.push(n);
                        }
                    }
                    _ => {}
                }
            }
        }
        libs
    }

    /// Append all stones of the group at `start` to `out`.
    pub fn collect_group(&self, start: Point, out: &mut Vec<Point>) {
        let color = self.stones[start as usize];
        debug_assert!(color != PointState::Empty);
        let mut visited = [false; NUM_POINTS];
        let mut stack = vec![start];
        visited[start as usize] = true;

        while let Some(pt) = stack.pop() {
            out.push(pt);
            for &n in neighbors(pt) {
                let ni = n as usize;
                if !visited[ni] && self.stones[ni] == color {
                    visited[ni] = true;
                    stack.push(n);
                }
            }
        }
    }

    /// Append the distinct liberties of the group at `start` to `out`,
    /// stopping once `cap` have been found.
    pub fn group_liberty_points(&self, start: Point, cap: usize, out: &mut Vec<Point>) {
        let color = self.stones[start as usize];
        debug_assert!(color != PointState::Empty);
        let mut visited = [false; NUM_POINTS];
        let mut lib_seen = [false; NUM_POINTS];
        let mut stack = vec![start];
        visited[start as usize] = true;

        while let Some(pt) = stack.pop() {
            for &n in neighbors(pt) {
                let ni = n as usize;
                match self.stones[ni] {
                    PointState::Empty => {
                        if !lib_seen[ni] {
                            lib_seen[ni] = true;
                            out.push(n);
                            if out.len() >= cap {
                                return;
                            }
                        }
                    }
                    c if c == color => {
                        if !visited[ni] {
                            visited[ni] = true;
                            stack.push(n);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn remove_group(&mut self, start: Point, captured: &mut Vec<Point>) {
        let color = self.stones[start as usize];
        let mut stack = vec![start];
        self.stones[start as usize] = PointState::Empty;
        captured.push(start);

        while let Some(pt) = stack.pop() {
            for &n in neighbors(pt) {
                let ni = n as usize;
                if self.stones[ni] == color {
                    self.stones[ni] = PointState::Empty;
                    captured.push(n);
                    stack.push(n);
                }
            }
        }
    }

    /// Write per-point group liberty counts into `out`: 0 for empty
    /// points, otherwise the group's liberties capped at 3 (the input
    /// planes only distinguish 1, 2 and >= 3).
    pub fn liberty_map(&self, out: &mut [u8]) {
        debug_assert!(out.len() >= NUM_POINTS);
        out[..NUM_POINTS].fill(0);
        let mut seen = [false; NUM_POINTS];
        let mut group = Vec::new();
        for p in 0..NUM_POINTS as Point {
            if seen[p as usize] || self.stones[p as usize] == PointState::Empty {
                continue;
            }
            let libs = self.group_liberties_upto(p, 3) as u8;
            group.clear();
            self.collect_group(p, &mut group);
            for &s in &group {
                seen[s as usize] = true;
                out[s as usize] = libs;
            }
        }
    }

    /// Write the Chinese-rules area map into `out`: +1 for points owned
    /// by Black, -1 for White, 0 for neither. Stones own their point;
    /// an empty region belongs to a color iff all its bordering stones
    /// are that color.
    pub fn area_map(&self, out: &mut [i8]) {
        debug_assert!(out.len() >= NUM_POINTS);
        let mut visited = [false; NUM_POINTS];
        for p in 0..NUM_POINTS {
            out[p] = match self.stones[p] {
                PointState::Stone(Player::Black) => 1,
                PointState::Stone(Player::White) => -1,
                PointState::Empty => 0,
            };
        }
        let mut region = Vec::new();
        for p in 0..NUM_POINTS as Point {
            if visited[p as usize] || self.stones[p as usize] != PointState::Empty {
                continue;
            }
            // Flood this empty region and record which colors border it.
            region.clear();
            let mut touches_black = false;
            let mut touches_white = false;
            let mut stack = vec![p];
            visited[p as usize] = true;
            while let Some(pt) = stack.pop() {
                region.push(pt);
                for &n in neighbors(pt) {
                    let ni = n as usize;
                    match self.stones[ni] {
                        PointState::Empty => {
                            if !visited[ni] {
                                visited[ni] = true;
                                stack.push(n);
                            }
                        }
                        PointState::Stone(Player::Black) => touches_black = true,
                        PointState::Stone(Player::White) => touches_white = true,
                    }
                }
            }
            let owner: i8 = match (touches_black, touches_white) {
                (true, false) => 1,
                (false, true) => -1,
                _ => 0,
            };
            if owner != 0 {
                for &pt in &region {
                    out[pt as usize] = owner;
                }
            }
        }
    }
}

// =============================================================================
// Coordinates
// =============================================================================

/// Column letters for move labels (skipping 'I' per Go convention).
const COL_LABELS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

/// Convert a point to `(x, y)` with `y = 0` at the top. Pass maps to
/// `(-1, -1)`.
#[inline]
pub fn point_to_xy(mv: Point) -> (i32, i32) {
    if mv == PASS {
        (-1, -1)
    } else {
        ((mv as usize % N) as i32, (mv as usize / N) as i32)
    }
}

/// Convert `(x, y)` coordinates (`y = 0` at the top) to a point.
#[inline]
pub fn xy_to_point(x: usize, y: usize) -> Point {
    debug_assert!(x < N && y < N);
    (y * N + x) as Point
}

/// Format a point as a move label like `"D4"` or `"pass"`. Row 19 is
/// the top of the grid, so the printed row is `19 - y`.
pub fn format_coord(mv: Point) -> String {
    if mv == PASS {
        return "pass".into();
    }
    let (x, y) = (mv as usize % N, mv as usize / N);
    format!("{}{}", COL_LABELS[x] as char, N - y)
}

/// Parse a move label like `"Q16"` (case-insensitive) or `"pass"`.
/// Returns `None` for anything that is not a valid 19x19 coordinate.
pub fn parse_coord(s: &str) -> Option<Point> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("pass") {
        return Some(PASS);
    }
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let col_char = bytes[0].to_ascii_uppercase();
    if col_char == b'I' {
        return None;
    }
    let x = COL_LABELS.iter().position(|&c| c == col_char)?;
    let row: usize = s[1..].parse().ok()?;
    if row == 0 || row > N {
        return None;
    }
    Some(xy_to_point(x, N - row))
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(k) = self.ko {
            writeln!(f, "ko: {}", format_coord(k))?;
        }
        for y in 0..N {
            write!(f, " {:>2} ", N - y)?;
            for x in 0..N {
                let c = match self.stones[y * N + x] {
                    PointState::Empty => '.',
                    PointState::Stone(Player::Black) => 'X',
                    PointState::Stone(Player::White) => 'O',
                };
                write!(f, " {}", c)?;
            }
            writeln!(f)?;
        }
        write!(f, "    ")?;
        for x in 0..N {
            write!(f, " {}", COL_LABELS[x] as char)?;
        }
        writeln!(f)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board {{")?;
        write!(f, "{}", self)?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(s: &str) -> Point {
        parse_coord(s).unwrap()
    }

    /// Play alternating moves starting with Black; "pass" allowed.
    fn setup_position(moves: &[&str]) -> Board {
        let mut board = Board::empty();
        let mut player = Player::Black;
        for m in moves {
            board.play(pt(m), player).unwrap();
            player = player.opponent();
        }
        board
    }

    #[test]
    fn neighbor_counts() {
        assert_eq!(neighbors(xy_to_point(0, 0)).len(), 2);
        assert_eq!(neighbors(xy_to_point(9, 0)).len(), 3);
        assert_eq!(neighbors(xy_to_point(9, 9)).len(), 4);
        assert_eq!(neighbors(xy_to_point(18, 18)).len(), 2);
    }

    #[test]
    fn play_basic() {
        let mut board = Board::empty();
        let d4 = pt("D4");
        board.play(d4, Player::Black).unwrap();
        assert_eq!(board.stone_at(d4), PointState::Stone(Player::Black));
        assert_eq!(board.ko(), None);
    }

    #[test]
    fn play_occupied() {
        let mut board = Board::empty();
        board.play(pt("D4"), Player::Black).unwrap();
        assert_eq!(
            board.play(pt("D4"), Player::White),
            Err(MoveError::Occupied)
        );
    }

    #[test]
    fn corner_suicide() {
        // Black at A2 and B1; White A1 would be suicide.
        let mut board = Board::empty();
        board.play(pt("A2"), Player::Black).unwrap();
        board.play(pt("B1"), Player::Black).unwrap();
        assert_eq!(board.play(pt("A1"), Player::White), Err(MoveError::Suicide));
        // Board unchanged by the rejected move.
        assert_eq!(board.stone_at(pt("A1")), PointState::Empty);
    }

    #[test]
    fn single_stone_capture() {
        // White A1 captured by Black at A2 + B1.
        let mut board = Board::empty();
        board.play(pt("A1"), Player::White).unwrap();
        board.play(pt("A2"), Player::Black).unwrap();
        let undo = board.play(pt("B1"), Player::Black).unwrap();
        assert_eq!(undo.captured(), &[pt("A1")]);
        assert_eq!(board.stone_at(pt("A1")), PointState::Empty);
        // Captured in the corner with two liberties afterwards: no ko.
        assert_eq!(board.ko(), None);
    }

    #[test]
    fn ko_detected_and_rejected() {
        // Classic ko: black E4 in atari inside the white wall E5/F4/E3,
        // black wall D5/C4/D3 around the empty D4.
        let mut board = Board::empty();
        for m in ["D5", "C4", "D3", "E4"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        for m in ["E5", "F4", "E3"] {
            board.play(pt(m), Player::White).unwrap();
        }
        // White captures the ko stone at E4 by playing D4.
        let undo = board.play(pt("D4"), Player::White).unwrap();
        assert_eq!(undo.captured(), &[pt("E4")]);
        assert_eq!(board.ko(), Some(pt("E4")));
        // Black may not retake immediately.
        assert_eq!(board.play(pt("E4"), Player::Black), Err(MoveError::Ko));
        // Any other move clears the ko.
        board.play(pt("Q16"), Player::Black).unwrap();
        assert_eq!(board.ko(), None);
    }

    #[test]
    fn multi_stone_capture_is_not_ko() {
        // Two white stones captured at once never produce a ko point.
        let mut board = Board::empty();
        for m in ["A2", "B2"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        for m in ["A1", "B1"] {
            board.play(pt(m), Player::White).unwrap();
        }
        let undo = board.play(pt("C1"), Player::Black).unwrap();
        let mut captured = undo.captured().to_vec();
        captured.sort_unstable();
        let mut expected = vec![pt("A1"), pt("B1")];
        expected.sort_unstable();
        assert_eq!(captured, expected);
        assert_eq!(board.ko(), None);
    }

    #[test]
    fn play_undo_restores_board() {
        let mut board = setup_position(&["D4", "Q16", "C3", "R4", "D16"]);
        let before = board.clone();

        let mv = pt("Q4");
        let undo = board.play(mv, Player::White).unwrap();
        assert_ne!(board, before);
        board.undo(mv, Player::White, undo);
        assert_eq!(board, before);
    }

    #[test]
    fn play_undo_restores_captures_and_ko() {
        let mut board = Board::empty();
        for m in ["D5", "C4", "D3", "E4"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        for m in ["E5", "F4", "E3"] {
            board.play(pt(m), Player::White).unwrap();
        }
        let before = board.clone();
        let undo = board.play(pt("D4"), Player::White).unwrap();
        board.undo(pt("D4"), Player::White, undo);
        assert_eq!(board, before);
    }

    #[test]
    fn pass_clears_and_undo_restores_ko() {
        let mut board = Board::empty();
        for m in ["D5", "C4", "D3", "E4"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        for m in ["E5", "F4", "E3"] {
            board.play(pt(m), Player::White).unwrap();
        }
        board.play(pt("D4"), Player::White).unwrap();
        assert!(board.ko().is_some());
        let ko = board.ko();
        let undo = board.play(PASS, Player::Black).unwrap();
        assert_eq!(board.ko(), None);
        board.undo(PASS, Player::Black, undo);
        assert_eq!(board.ko(), ko);
    }

    #[test]
    fn liberty_map_caps_at_three() {
        let board = setup_position(&["D4"]);
        let mut libs = [0u8; NUM_POINTS];
        board.liberty_map(&mut libs);
        // A lone center stone has 4 liberties, capped at 3.
        assert_eq!(libs[pt("D4") as usize], 3);
        assert_eq!(libs[pt("E4") as usize], 0);

        let board = setup_position(&["A1"]);
        board.liberty_map(&mut libs);
        assert_eq!(libs[pt("A1") as usize], 2);
    }

    #[test]
    fn area_map_encloses_corner() {
        // Black wall on the third line around the A1 corner: A3 B3 C3 C2 C1.
        let mut board = Board::empty();
        for m in ["A3", "B3", "C3", "C2", "C1"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        let mut area = [0i8; NUM_POINTS];
        board.area_map(&mut area);
        for m in ["A1", "B1", "A2", "B2"] {
            assert_eq!(area[pt(m) as usize], 1, "{m} should be black area");
        }
        for m in ["A3", "C1"] {
            assert_eq!(area[pt(m) as usize], 1, "stones are their own area");
        }
        // The open rest of the board touches only black too, so it is
        // black area as well until White appears.
        let mut board2 = board.clone();
        board2.play(pt("Q16"), Player::White).unwrap();
        board2.area_map(&mut area);
        assert_eq!(area[pt("K10") as usize], 0);
        assert_eq!(area[pt("A1") as usize], 1);
    }

    #[test]
    fn plausibly_legal_rejects_ko_and_occupied() {
        let mut board = Board::empty();
        for m in ["D5", "C4", "D3", "E4"] {
            board.play(pt(m), Player::Black).unwrap();
        }
        for m in ["E5", "F4", "E3"] {
            board.play(pt(m), Player::White).unwrap();
        }
        board.play(pt("D4"), Player::White).unwrap();
        let ko = board.ko().unwrap();
        assert!(!board.is_plausibly_legal(ko, Player::Black));
        assert!(!board.is_plausibly_legal(pt("D5"), Player::Black));
        assert!(board.is_plausibly_legal(pt("K10"), Player::Black));
    }

    #[test]
    fn plausibly_legal_superset_of_strict() {
        // Every move accepted by play() must be plausibly legal first.
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let mut board = Board::empty();
        let mut player = Player::Black;
        for _ in 0..200 {
            let mv = rng.u16(0..NUM_POINTS as u16);
            let plausible = board.is_plausibly_legal(mv, player);
            let mut probe = board.clone();
            if probe.play(mv, player).is_ok() {
                assert!(plausible, "strictly legal move {mv} not plausibly legal");
                board = probe;
                player = player.opponent();
            }
        }
    }

    #[test]
    fn from_stones_roundtrip_and_validation() {
        let board = setup_position(&["D4", "Q16", "C3"]);
        let rebuilt = Board::from_stones(*board.stones(), board.ko()).unwrap();
        assert_eq!(rebuilt, board);

        // A stone with no liberties is rejected.
        let mut stones = [PointState::Empty; NUM_POINTS];
        stones[pt("A1") as usize] = PointState::Stone(Player::White);
        stones[pt("A2") as usize] = PointState::Stone(Player::Black);
        stones[pt("B1") as usize] = PointState::Stone(Player::Black);
        assert!(matches!(
            Board::from_stones(stones, None),
            Err(MoveError::DeadGroup { .. })
        ));
    }

    #[test]
    fn coord_roundtrip_all_points() {
        for mv in 0..=NUM_POINTS as Point {
            let label = format_coord(mv);
            assert_eq!(parse_coord(&label), Some(mv), "roundtrip for {label}");
        }
        assert_eq!(parse_coord("pass"), Some(PASS));
        assert_eq!(parse_coord("I5"), None);
        assert_eq!(parse_coord("T19"), Some(xy_to_point(18, 0)));
        assert_eq!(parse_coord("A1"), Some(xy_to_point(0, 18)));
        assert_eq!(point_to_xy(PASS), (-1, -1));
    }
}
