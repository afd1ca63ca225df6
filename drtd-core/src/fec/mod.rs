//! Forward error correction primitives
//!
//! A polynomial over GF(2) packed into one machine word, the finite field
//! GF(2^m) built on top of it, and a BCH(n, k, t) codec used by the POCSAG
//! decoder as BCH(31, 21, 2).

mod bch;
mod field;
mod z2;

pub use bch::{BchCode, EncodingShape};
pub use field::FiniteField;
pub use z2::Z2Polynomial;
