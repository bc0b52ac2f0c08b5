use std::collections::{BTreeSet, HashMap};

use crate::error::{RapmError, RapmResult};
use crate::event::PlayerId;
use crate::metric::TargetMetric;
use crate::stint::Stint;

/// Row-compressed signed indicator matrix. Each row holds roughly ten
/// non-zeros, so memory scales with the number of stints.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseDesign {
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseDesign {
    /// Builds a matrix from per-row `(column, value)` entries. Entries for the
    /// same column within a row are summed; zero sums are dropped.
    pub fn from_rows<I, R>(n_cols: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (usize, f64)>,
    {
        let mut row_ptr = vec![0];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for row in rows {
            let mut entries: Vec<(usize, f64)> = row.into_iter().collect();
            entries.sort_by_key(|&(c, _)| c);
            let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
            for (c, v) in entries {
                match merged.last_mut() {
                    Some(last) if last.0 == c => last.1 += v,
                    _ => merged.push((c, v)),
                }
            }
            for (c, v) in merged {
                if v != 0.0 {
                    col_idx.push(c);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self {
            n_cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// `X · v`
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        (0..self.n_rows())
            .map(|i| self.row(i).map(|(c, x)| x * v[c]).sum())
            .collect()
    }

    /// `Xᵀ · u`
    pub fn transpose_mul_vec(&self, u: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_cols];
        for (i, ui) in u.iter().enumerate() {
            for (c, x) in self.row(i) {
                out[c] += x * ui;
            }
        }
        out
    }

    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows())
            .map(|i| {
                let mut row = vec![0.0; self.n_cols];
                for (c, x) in self.row(i) {
                    row[c] = x;
                }
                row
            })
            .collect()
    }
}

/// Regression inputs: `x` rows are stints, columns follow `players`.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: SparseDesign,
    pub y: Vec<f64>,
    pub w: Vec<f64>,
    pub players: Vec<PlayerId>,
}

pub fn build_design(stints: &[Stint], metric: &dyn TargetMetric) -> RapmResult<DesignMatrix> {
    if stints.is_empty() {
        return Err(RapmError::EmptyInput(
            "stint collection is empty after filtering".to_string(),
        ));
    }

    let players: Vec<PlayerId> = stints
        .iter()
        .flat_map(|s| s.players_team_a.iter().chain(&s.players_team_b))
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let col: HashMap<PlayerId, usize> = players
        .iter()
        .enumerate()
        .map(|(idx, &pid)| (pid, idx))
        .collect();

    let x = SparseDesign::from_rows(
        players.len(),
        stints.iter().map(|s| {
            s.players_team_a
                .iter()
                .map(|p| (col[p], 1.0))
                .chain(s.players_team_b.iter().map(|p| (col[p], -1.0)))
                .collect::<Vec<_>>()
        }),
    );
    let y = stints.iter().map(|s| metric.target(s)).collect();
    let w = stints.iter().map(|s| f64::from(s.possessions)).collect();

    Ok(DesignMatrix { x, y, w, players })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::ResponseMetric;

    fn stint(a: &[u64], b: &[u64], diff: i32, poss: u32) -> Stint {
        Stint {
            game_id: "g".into(),
            period: 1,
            start_idx: 0,
            end_idx: 0,
            team_a: 1,
            team_b: 2,
            players_team_a: a.to_vec(),
            players_team_b: b.to_vec(),
            possessions: poss,
            pts_diff: diff,
            pts_per_poss_diff: f64::from(diff) / f64::from(poss),
        }
    }

    #[test]
    fn rows_sum_to_zero_for_five_on_five() {
        let stints = vec![
            stint(&[1, 2, 3, 4, 5], &[6, 7, 8, 9, 10], 4, 8),
            stint(&[1, 2, 3, 5, 11], &[6, 7, 8, 9, 12], -2, 4),
        ];
        let design = build_design(&stints, &ResponseMetric::PtsPerPossDiff).unwrap();
        assert_eq!(design.players.len(), 12);
        for row in design.x.to_dense() {
            assert_eq!(row.iter().sum::<f64>(), 0.0);
            assert_eq!(row.iter().filter(|v| **v != 0.0).count(), 10);
        }
        assert_eq!(design.y, vec![0.5, -0.5]);
        assert_eq!(design.w, vec![8.0, 4.0]);
    }

    #[test]
    fn columns_sorted_by_player_id() {
        let stints = vec![stint(&[30, 10], &[20, 5], 1, 1)];
        let design = build_design(&stints, &ResponseMetric::NetRating).unwrap();
        assert_eq!(design.players, vec![5, 10, 20, 30]);
        assert_eq!(design.x.to_dense()[0], vec![-1.0, 1.0, -1.0, 1.0]);
        assert_eq!(design.y, vec![100.0]);
    }

    #[test]
    fn player_on_both_sides_in_different_stints() {
        let stints = vec![stint(&[1], &[2], 1, 1), stint(&[2], &[1], 1, 1)];
        let dense = build_design(&stints, &ResponseMetric::PtsPerPossDiff)
            .unwrap()
            .x
            .to_dense();
        assert_eq!(dense, vec![vec![1.0, -1.0], vec![-1.0, 1.0]]);
    }

    #[test]
    fn empty_input_fails_fast() {
        let err = build_design(&[], &ResponseMetric::PtsPerPossDiff).unwrap_err();
        assert!(matches!(err, RapmError::EmptyInput(_)));
    }

    #[test]
    fn sparse_products_match_dense() {
        let x = SparseDesign::from_rows(
            3,
            vec![vec![(0, 1.0), (2, -1.0)], vec![(1, 2.0), (1, 1.0)]],
        );
        assert_eq!(x.nnz(), 3);
        assert_eq!(x.mul_vec(&[1.0, 2.0, 3.0]), vec![-2.0, 6.0]);
        assert_eq!(x.transpose_mul_vec(&[1.0, 2.0]), vec![1.0, 6.0, -1.0]);
    }
}
