//! BCH(n, k, t) encoding and correction
//!
//! Correction is Peterson-Gorenstein-Zierler: compute the 2t syndromes,
//! solve the syndrome system for the error-locator coefficients (shrinking
//! the matrix while it is singular), then find the locator roots by
//! exhaustive evaluation over the field's root table. Each root marks one
//! bit to flip.

use log::debug;

use super::{FiniteField, Z2Polynomial};

/// How message bits map into a codeword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingShape {
    /// Codeword is message times generator.
    Factor,
    /// Systematic: message in the top bits, remainder appended.
    Prefix,
}

#[derive(Debug, Clone)]
pub struct BchCode {
    n: u32,
    k: u32,
    t: u32,
    shape: EncodingShape,
    generator: Z2Polynomial,
    field: FiniteField,
}

impl BchCode {
    pub fn new(n: u32, k: u32, t: u32, shape: EncodingShape, generator: Z2Polynomial) -> Self {
        assert!(n > 0 && n >= k && t > 0);
        let field_exponent = u32::BITS - n.leading_zeros();
        Self {
            n,
            k,
            t,
            shape,
            generator,
            field: FiniteField::new(field_exponent),
        }
    }

    pub fn encode(&self, message: u64) -> u64 {
        let message = Z2Polynomial::new(message);
        debug_assert!(message.is_zero() || message.degree() < self.k);

        match self.shape {
            EncodingShape::Factor => (message * self.generator).coefficients(),
            EncodingShape::Prefix => {
                let shifted = Z2Polynomial::new(message.coefficients() << (self.n - self.k));
                (shifted + shifted % self.generator).coefficients()
            }
        }
    }

    pub fn decode(&self, codeword: u64) -> u64 {
        match self.shape {
            EncodingShape::Factor => {
                (Z2Polynomial::new(codeword) / self.generator).coefficients()
            }
            EncodingShape::Prefix => (codeword >> (self.n - self.k)) & ((1u64 << self.k) - 1),
        }
    }

    /// Correct up to `t` bit errors; `None` when the word is uncorrectable.
    pub fn correct(&self, codeword: u64) -> Option<u64> {
        let received = Z2Polynomial::new(codeword);
        if !received.is_zero() && received.degree() >= self.n {
            return None;
        }

        let syndrome_count = 2 * self.t as usize;
        let mut syndromes = Vec::with_capacity(syndrome_count);
        let mut errors_detected = false;
        for i in 1..=syndrome_count {
            let syndrome = self.field.syndrome(received, i);
            errors_detected |= !syndrome.is_zero();
            syndromes.push(syndrome);
        }

        if !errors_detected {
            return Some(codeword);
        }

        let locator = self.error_locator(&syndromes)?;

        let mut corrected = codeword;
        let mut roots_found = 0u32;
        for &root in self.field.roots() {
            let mut sum = Z2Polynomial::new(1);
            for (power, &coefficient) in locator.iter().enumerate() {
                sum += self.field.multiply(coefficient, self.field.power(root, power + 1));
            }

            if sum.is_zero() {
                roots_found += 1;
                let location = (self.field.element_count() - self.field.root_exponent(root))
                    % self.field.element_count();
                corrected ^= 1u64 << location;
            }
        }

        if roots_found == 0 {
            debug!("error locator polynomial has no roots, rejecting word");
            return None;
        }

        Some(corrected)
    }

    /// Solve the syndrome system for [sigma_1 .. sigma_nu]. Starts at
    /// nu = t and shrinks while the system is singular.
    fn error_locator(&self, syndromes: &[Z2Polynomial]) -> Option<Vec<Z2Polynomial>> {
        let mut nu = self.t as usize;
        while nu > 0 {
            // A[r][c] = S_{r+c+1}, rhs[r] = S_{r+nu+1}
            let mut rows: Vec<Vec<Z2Polynomial>> = (0..nu)
                .map(|r| {
                    let mut row: Vec<Z2Polynomial> =
                        (0..nu).map(|c| syndromes[r + c]).collect();
                    row.push(syndromes[r + nu]);
                    row
                })
                .collect();

            match self.solve(&mut rows, nu) {
                Some(solution) => {
                    // Solution is [sigma_nu .. sigma_1]; flip to sigma_1 first
                    return Some(solution.into_iter().rev().collect());
                }
                None => nu -= 1,
            }
        }
        None
    }

    /// Gaussian elimination over GF(2^m) on an augmented nu x (nu+1) system.
    fn solve(&self, rows: &mut [Vec<Z2Polynomial>], nu: usize) -> Option<Vec<Z2Polynomial>> {
        for column in 0..nu {
            let pivot_row = (column..nu).find(|&r| !rows[r][column].is_zero())?;
            rows.swap(column, pivot_row);

            let inverse = self.field.inverse(rows[column][column]);
            for value in rows[column].iter_mut() {
                *value = self.field.multiply(*value, inverse);
            }

            for r in 0..nu {
                if r == column || rows[r][column].is_zero() {
                    continue;
                }
                let factor = rows[r][column];
                for c in 0..=nu {
                    let scaled = self.field.multiply(factor, rows[column][c]);
                    rows[r][c] += scaled;
                }
            }
        }

        Some(rows.iter().map(|row| row[nu]).collect())
    }
}
