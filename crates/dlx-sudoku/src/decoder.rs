//! DLXS stream to solved-grid decoding.

use std::io::{Read, Write};

use dlx_codec::SolutionStreamReader;

use crate::{box_index, Candidate, Grid, SudokuError, DIGIT_COUNT, GRID_SIZE};

/// Replay one solution's row ids against the candidate list, validating
/// consistency with the givens and the Sudoku rules, and requiring a
/// completely filled grid.
fn apply_solution(
    grid: &Grid,
    candidates: &[Candidate],
    row_indices: &[u32],
) -> Result<[[u8; GRID_SIZE]; GRID_SIZE], SudokuError> {
    let mut solved = [[0u8; GRID_SIZE]; GRID_SIZE];
    let mut row_used = [[false; DIGIT_COUNT + 1]; GRID_SIZE];
    let mut col_used = [[false; DIGIT_COUNT + 1]; GRID_SIZE];
    let mut box_used = [[false; DIGIT_COUNT + 1]; GRID_SIZE];

    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            let given = grid.get(row, col);
            if given > 0 {
                solved[row][col] = given;
                row_used[row][given as usize] = true;
                col_used[col][given as usize] = true;
                box_used[box_index(row, col)][given as usize] = true;
            }
        }
    }

    for &value in row_indices {
        if value == 0 || value as usize > candidates.len() {
            return Err(SudokuError::InvalidRowId { value });
        }
        let candidate = candidates[value as usize - 1];
        let row = candidate.row as usize;
        let col = candidate.col as usize;
        let digit = candidate.digit;

        if grid.get(row, col) != 0 {
            if grid.get(row, col) != digit {
                return Err(SudokuError::SolutionConflict { row, col, digit });
            }
            continue;
        }
        if solved[row][col] != 0 && solved[row][col] != digit {
            return Err(SudokuError::SolutionConflict { row, col, digit });
        }
        let d = digit as usize;
        if row_used[row][d] || col_used[col][d] || box_used[box_index(row, col)][d] {
            return Err(SudokuError::SolutionConflict { row, col, digit });
        }

        solved[row][col] = digit;
        row_used[row][d] = true;
        col_used[col][d] = true;
        box_used[box_index(row, col)][d] = true;
    }

    for row in 0..GRID_SIZE {
        for col in 0..GRID_SIZE {
            if solved[row][col] == 0 {
                return Err(SudokuError::IncompleteSolution { row, col });
            }
        }
    }

    Ok(solved)
}

fn write_grid<W: Write>(
    output: &mut W,
    grid: &[[u8; GRID_SIZE]; GRID_SIZE],
    solution_index: usize,
) -> Result<(), SudokuError> {
    writeln!(output, "Solution #{solution_index}")?;
    for row in grid {
        for &digit in row {
            write!(output, "{digit}")?;
        }
        writeln!(output)?;
    }
    writeln!(output)?;
    Ok(())
}

/// Read a DLXS stream and emit `"Solution #k"` blocks, nine 9-digit lines
/// and a blank line each, for every solution row. Returns the number of
/// solutions decoded.
pub fn decode_solutions<R: Read, W: Write>(
    grid: &Grid,
    input: R,
    output: &mut W,
) -> Result<usize, SudokuError> {
    let candidates = grid.candidates()?;
    let mut reader = SolutionStreamReader::new(input);
    reader.read_header().map_err(SudokuError::Dlx)?;

    let mut count = 0usize;
    loop {
        let row_indices = match reader.read_row()? {
            Some(row) => row.row_indices.clone(),
            None => break,
        };
        let solved = apply_solution(grid, &candidates, &row_indices)?;
        count += 1;
        write_grid(output, &solved, count)?;
    }
    output.flush()?;
    Ok(count)
}
