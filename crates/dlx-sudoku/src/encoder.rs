//! Puzzle to DLXB cover encoding.

use std::io::Write;

use dlx_types::Problem;

use crate::{
    box_index, Candidate, Grid, SudokuError, BOX_DIGIT_OFFSET, COLUMN_COUNT, COL_DIGIT_OFFSET,
    DIGIT_COUNT, GRID_SIZE, ROW_DIGIT_OFFSET,
};

/// The four constraint columns a candidate satisfies: its cell, row/digit,
/// column/digit, and box/digit, at fixed offsets `{0, 81, 162, 243}`.
#[must_use]
pub fn column_indices(candidate: &Candidate) -> [u32; 4] {
    let row = candidate.row as u32;
    let col = candidate.col as u32;
    let digit = candidate.digit as u32;
    let grid = GRID_SIZE as u32;
    let digits = DIGIT_COUNT as u32;
    [
        row * grid + col,
        ROW_DIGIT_OFFSET + row * digits + (digit - 1),
        COL_DIGIT_OFFSET + col * digits + (digit - 1),
        BOX_DIGIT_OFFSET
            + box_index(candidate.row as usize, candidate.col as usize) as u32 * digits
            + (digit - 1),
    ]
}

/// Build the cover problem: 324 columns, one row per legal candidate with
/// 1-based sequential row ids.
pub fn encode_cover(grid: &Grid) -> Result<Problem, SudokuError> {
    let candidates = grid.candidates()?;
    let mut problem = Problem::new(COLUMN_COUNT);
    for (index, candidate) in candidates.iter().enumerate() {
        problem.push_row(index as u32 + 1, column_indices(candidate).to_vec());
    }
    Ok(problem)
}

/// Encode and serialize the cover in DLXB form.
pub fn write_cover<W: Write>(grid: &Grid, output: &mut W) -> Result<(), SudokuError> {
    let problem = encode_cover(grid)?;
    dlx_codec::write_problem(output, &problem)?;
    output.flush()?;
    Ok(())
}
