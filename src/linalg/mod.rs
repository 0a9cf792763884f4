//! Dense linear algebra kernels backing the least-squares solvers.

pub mod householder;
pub mod qr;

pub use qr::{
    qr_decompose, qr_solve, qr_solve_compact, qr_solve_factored, weight_rows, QrSolution,
};
