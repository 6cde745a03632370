//! Arena-backed intrusive Dancing Links matrix.
//!
//! Every node lives in one contiguous arena and links to its neighbors by
//! arena index. Index 0 is the root; indices `1..=C` are column headers;
//! the rest is a sequence of option-row blocks, each preceded by a spacer,
//! with one trailing spacer after the last row.
//!
//! Arena adjacency is a structural invariant: the option nodes of a row
//! occupy consecutive indices, so a row can be walked by index increment
//! until a spacer (a node whose `top` is the root) is reached. Spacers
//! carry the previous row's negated id in `data`, point `up` at the first
//! option node of the previous row, and `down` at the last option node of
//! the next row.

use std::io::Write;

use dlx_error::{DlxError, Result};
use dlx_types::{limits, Problem};

/// Arena index of the root node.
pub const ROOT: usize = 0;

/// One arena element.
///
/// `len` is meaningful for column headers only (live option count).
/// `data` holds the column id for headers (>= 1), the node's own arena
/// index for option nodes, the negated row id for spacers (0 for the
/// first spacer), and 0 for the root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Node {
    pub len: i32,
    pub data: i32,
    pub top: usize,
    pub up: usize,
    pub down: usize,
    pub left: usize,
    pub right: usize,
}

/// The generated matrix plus the counts the solver driver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverMatrix {
    pub(crate) nodes: Vec<Node>,
    column_count: usize,
    option_count: usize,
}

impl CoverMatrix {
    /// Build the arena from a decoded problem.
    ///
    /// Chunk columns are sorted ascending before insertion; duplicate or
    /// out-of-range indices, row ids or node totals beyond the arena's
    /// addressable range are rejected.
    pub fn build(problem: &Problem) -> Result<Self> {
        let column_count = problem.header.column_count;
        if column_count > limits::MAX_COLUMNS {
            return Err(DlxError::TooManyNodes {
                nodes: u64::from(column_count),
                max: u64::from(limits::MAX_COLUMNS),
            });
        }
        if problem.rows.len() as u64 > u64::from(limits::MAX_ROW_ID) {
            return Err(DlxError::RowCountOverflow {
                what: "row count",
                value: problem.rows.len() as u64,
            });
        }

        let mut total_entries: u64 = 0;
        let mut sorted_rows: Vec<(u32, Vec<u32>)> = Vec::with_capacity(problem.rows.len());
        for (index, chunk) in problem.rows.iter().enumerate() {
            let row_id = problem.resolved_row_id(index);
            if row_id > limits::MAX_ROW_ID {
                return Err(DlxError::RowCountOverflow {
                    what: "row id",
                    value: u64::from(row_id),
                });
            }

            let mut columns = chunk.columns.clone();
            columns.sort_unstable();
            for pair in columns.windows(2) {
                if pair[0] == pair[1] {
                    return Err(DlxError::DuplicateColumn {
                        column: pair[0],
                        row_id,
                    });
                }
            }
            if let Some(&last) = columns.last() {
                if last >= column_count {
                    return Err(DlxError::ColumnOutOfRange {
                        column: last,
                        column_count,
                    });
                }
            }

            total_entries += columns.len() as u64;
            sorted_rows.push((row_id, columns));
        }

        let spacer_count = sorted_rows.len() as u64 + 1;
        let total_nodes = u64::from(column_count) + total_entries + spacer_count;
        if total_nodes > limits::MAX_ARENA_NODES {
            return Err(DlxError::TooManyNodes {
                nodes: total_nodes,
                max: limits::MAX_ARENA_NODES,
            });
        }

        let mut nodes = vec![Node::default(); total_nodes as usize + 1];
        let columns = column_count as usize;

        // Root and the circular column-header ring.
        for i in 1..=columns {
            nodes[i] = Node {
                len: 0,
                data: i as i32,
                top: ROOT,
                up: i,
                down: i,
                left: i - 1,
                right: ROOT,
            };
            nodes[i - 1].right = i;
            nodes[ROOT].left = i;
        }

        // Row blocks, each preceded by a spacer carrying the previous
        // row's negated id (0 for the very first spacer).
        let mut cursor = columns;
        let mut prev_row_len = 0usize;
        let mut pending_row_id: Option<i32> = None;

        for (row_id, columns_for_row) in &sorted_rows {
            let spacer = cursor + 1;
            nodes[spacer].top = ROOT;
            nodes[spacer].data = pending_row_id.map_or(0, |id| -id);
            if prev_row_len == 0 {
                nodes[spacer].up = ROOT;
            } else {
                nodes[cursor - prev_row_len].down = cursor;
                nodes[spacer].up = spacer - prev_row_len;
            }
            cursor = spacer;
            prev_row_len = 0;
            pending_row_id = Some(*row_id as i32);

            for &column in columns_for_row {
                let header = column as usize + 1;
                let new_index = cursor + 1;
                let last = nodes[header].up;

                nodes[new_index] = Node {
                    len: 0,
                    data: new_index as i32,
                    top: header,
                    up: last,
                    down: header,
                    left: 0,
                    right: 0,
                };
                nodes[header].len += 1;
                nodes[header].up = new_index;
                nodes[last].down = new_index;

                cursor = new_index;
                prev_row_len += 1;
            }
        }

        // Trailing spacer closes the last row's chain.
        let spacer = cursor + 1;
        nodes[spacer].top = ROOT;
        nodes[spacer].data = pending_row_id.map_or(0, |id| -id);
        nodes[spacer].down = ROOT;
        if prev_row_len == 0 {
            nodes[spacer].up = ROOT;
        } else {
            nodes[cursor - prev_row_len].down = cursor;
            nodes[spacer].up = spacer - prev_row_len;
        }

        tracing::debug!(
            target: "dlx::engine",
            columns = column_count,
            options = sorted_rows.len(),
            nodes = nodes.len(),
            "generated cover matrix"
        );

        Ok(Self {
            nodes,
            column_count: columns,
            option_count: sorted_rows.len(),
        })
    }

    /// Number of constraint columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of option rows.
    #[must_use]
    pub fn option_count(&self) -> usize {
        self.option_count
    }

    /// The full arena, root included. Exposed for structural assertions.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether the node at `index` is a spacer (or the root itself).
    #[inline]
    #[must_use]
    pub fn is_spacer(&self, index: usize) -> bool {
        self.nodes[index].top == ROOT && index > self.column_count
    }

    /// Verify the structural invariants that must hold between search
    /// steps: the header ring is circular and mutually linked, every
    /// column's vertical ring is intact with `len` equal to its live
    /// option count, and every option node reaches a spacer by index
    /// increment. Returns a description of the first violation found.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let nodes = &self.nodes;

        // Horizontal ring off the root.
        let mut at = nodes[ROOT].right;
        let mut ring = 0usize;
        while at != ROOT {
            if at > self.column_count {
                return Err(format!("non-header node {at} in column ring"));
            }
            if nodes[nodes[at].right].left != at {
                return Err(format!("column {at} not mutually linked rightwards"));
            }
            ring += 1;
            if ring > self.column_count {
                return Err("column ring does not close".to_owned());
            }
            at = nodes[at].right;
        }

        // Vertical rings and len accounting.
        for header in 1..=self.column_count {
            let mut live = 0usize;
            let mut at = nodes[header].down;
            while at != header {
                if nodes[at].top != header {
                    return Err(format!("node {at} in column {header} has wrong top"));
                }
                if nodes[nodes[at].down].up != at {
                    return Err(format!("node {at} not mutually linked downwards"));
                }
                live += 1;
                if live > nodes.len() {
                    return Err(format!("column {header} ring does not close"));
                }
                at = nodes[at].down;
            }
            if nodes[header].len != live as i32 {
                return Err(format!(
                    "column {header} len {} but {live} live nodes",
                    nodes[header].len
                ));
            }
        }

        // Row walks terminate at spacers.
        for index in self.column_count + 1..nodes.len() {
            if nodes[index].top == ROOT {
                continue;
            }
            let mut at = index;
            while nodes[at].data > 0 {
                at += 1;
                if at >= nodes.len() {
                    return Err(format!("row walk from {index} ran off the arena"));
                }
            }
        }

        Ok(())
    }

    /// Emit a deterministic textual dump of the arena: one line per node
    /// with its role, index, data, len, and link indices.
    pub fn dump_structure<W: Write>(&self, output: &mut W) -> std::io::Result<()> {
        writeln!(
            output,
            "MATRIX item_count={} total_nodes={}",
            self.column_count,
            self.nodes.len() - 1
        )?;
        for (i, node) in self.nodes.iter().enumerate() {
            let role = if i == ROOT {
                "HEAD"
            } else if i <= self.column_count {
                "COLUMN"
            } else if node.top == ROOT {
                "SPACER"
            } else {
                "NODE"
            };
            writeln!(
                output,
                "{role} index={i} data={} len={} top={} left={} right={} up={} down={}",
                node.data, node.len, node.top, node.left, node.right, node.up, node.down
            )?;
        }
        output.flush()
    }
}
