//! Recursive Algorithm X over the Dancing Links arena.
//!
//! Column selection uses the MRV heuristic (minimum `len`, first-seen wins,
//! early exit on an empty column). Cover and uncover are exact inverses:
//! every link edit made on the way down is undone in reverse order on the
//! way back, so the arena is bit-identical after `solve` returns.

use crate::matrix::{CoverMatrix, ROOT};
use crate::sink::{SolutionSink, SolutionView};

/// Owns a matrix plus the per-depth scratch buffers for one search run.
pub struct Solver {
    matrix: CoverMatrix,
    row_ids: Vec<u32>,
    labels: Vec<String>,
}

impl Solver {
    /// Wrap a freshly generated matrix, sizing the per-depth scratch to the
    /// option count (worst-case recursion depth).
    #[must_use]
    pub fn new(matrix: CoverMatrix) -> Self {
        let option_count = matrix.option_count();
        Self {
            matrix,
            row_ids: vec![0; option_count],
            labels: vec![String::new(); option_count],
        }
    }

    #[must_use]
    pub fn matrix(&self) -> &CoverMatrix {
        &self.matrix
    }

    pub fn into_matrix(self) -> CoverMatrix {
        self.matrix
    }

    /// Run the search to completion, invoking the sink once per solution.
    pub fn solve(&mut self, sink: &mut dyn SolutionSink) {
        tracing::debug!(
            target: "dlx::engine",
            columns = self.matrix.column_count(),
            options = self.matrix.option_count(),
            "search started"
        );
        self.search_at(0, sink);
    }

    fn search_at(&mut self, depth: usize, sink: &mut dyn SolutionSink) {
        // All columns covered: the chosen rows partition the column set.
        if self.matrix.nodes[ROOT].right == ROOT {
            let view = SolutionView {
                labels: &self.labels[..depth],
                row_ids: &self.row_ids[..depth],
            };
            sink.on_solution(&view);
            sink.flush();
            return;
        }

        let column = self.pick_column();
        self.cover(column);

        let mut option = self.matrix.nodes[column].down;
        while option != column {
            let row_id = self.row_id_of(option);
            self.row_ids[depth] = row_id;
            self.labels[depth] = row_id.to_string();

            // Cover the other columns of this option's row, forward by
            // index; the trailing spacer wraps to the row's first node.
            let mut part = option + 1;
            while part != option {
                let node = self.matrix.nodes[part];
                if node.top == ROOT {
                    part = node.up;
                } else {
                    self.cover(node.top);
                    part += 1;
                }
            }

            self.search_at(depth + 1, sink);

            // Mirror image: uncover in reverse order, backward by index;
            // the leading spacer wraps to the row's last node.
            let mut part = option - 1;
            while part != option {
                let node = self.matrix.nodes[part];
                if node.top == ROOT {
                    part = node.down;
                } else {
                    self.uncover(node.top);
                    part -= 1;
                }
            }

            option = self.matrix.nodes[option].down;
        }

        self.uncover(column);
    }

    /// MRV: the uncovered column with minimum `len`; ties break to the
    /// first seen in ring order; a column with no options short-circuits.
    fn pick_column(&self) -> usize {
        let nodes = &self.matrix.nodes;
        let mut best = ROOT;
        let mut best_len = i32::MAX;
        let mut at = nodes[ROOT].right;
        while at != ROOT {
            let len = nodes[at].len;
            if len < best_len {
                best = at;
                best_len = len;
                if best_len == 0 {
                    return best;
                }
            }
            at = nodes[at].right;
        }
        best
    }

    /// Walk forward by index from an option node to its row's trailing
    /// spacer and read the row id from the spacer's negated `data`.
    fn row_id_of(&self, option: usize) -> u32 {
        let mut at = option;
        while self.matrix.nodes[at].data > 0 {
            at += 1;
        }
        (-self.matrix.nodes[at].data) as u32
    }

    /// Remove `column` from the header ring and hide every row that uses it.
    fn cover(&mut self, column: usize) {
        let mut p = self.matrix.nodes[column].down;
        while p != column {
            self.hide(p);
            p = self.matrix.nodes[p].down;
        }
        let left = self.matrix.nodes[column].left;
        let right = self.matrix.nodes[column].right;
        self.matrix.nodes[left].right = right;
        self.matrix.nodes[right].left = left;
    }

    /// Splice every other node of `p`'s row out of its column's vertical
    /// ring, decrementing that column's `len`.
    fn hide(&mut self, p: usize) {
        let mut q = p + 1;
        while q != p {
            let node = self.matrix.nodes[q];
            if node.top == ROOT {
                q = node.up;
            } else {
                self.matrix.nodes[node.up].down = node.down;
                self.matrix.nodes[node.down].up = node.up;
                self.matrix.nodes[node.top].len -= 1;
                q += 1;
            }
        }
    }

    /// Exact inverse of [`Self::cover`].
    fn uncover(&mut self, column: usize) {
        let left = self.matrix.nodes[column].left;
        let right = self.matrix.nodes[column].right;
        self.matrix.nodes[left].right = column;
        self.matrix.nodes[right].left = column;

        let mut p = self.matrix.nodes[column].up;
        while p != column {
            self.unhide(p);
            p = self.matrix.nodes[p].up;
        }
    }

    /// Exact inverse of [`Self::hide`].
    fn unhide(&mut self, p: usize) {
        let mut q = p - 1;
        while q != p {
            let node = self.matrix.nodes[q];
            if node.top == ROOT {
                q = node.down;
            } else {
                self.matrix.nodes[node.up].down = q;
                self.matrix.nodes[node.down].up = q;
                self.matrix.nodes[node.top].len += 1;
                q -= 1;
            }
        }
    }
}
