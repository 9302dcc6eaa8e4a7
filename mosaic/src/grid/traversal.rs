use super::GridPos;

/// Grid positions along anti-diagonals from the top-left corner, each
/// diagonal walked top to bottom.
///
/// A tile's North and West neighbors always come before the tile, and a tile
/// stays "open" (waiting for its South/East pairs) for roughly one diagonal,
/// which keeps the working set near `min(rows, cols)` tiles.
pub fn diagonal_order(rows: usize, cols: usize) -> Vec<GridPos> {
    let mut out = Vec::with_capacity(rows * cols);
    if rows == 0 || cols == 0 {
        return out;
    }
    for diag in 0..rows + cols - 1 {
        let first_row = diag.saturating_sub(cols - 1);
        let last_row = diag.min(rows - 1);
        for row in first_row..=last_row {
            out.push(GridPos::new(row, diag - row));
        }
    }
    out
}
