//! GF(2^m) built from an irreducible polynomial
//!
//! The irreducible polynomial is found by trial division over all lower
//! degree polynomials. Primitive powers of alpha = x are tabulated both
//! ways (power -> element, element -> power) so multiplication and
//! inversion are table lookups.

use log::debug;

use super::Z2Polynomial;

#[derive(Debug, Clone)]
pub struct FiniteField {
    exponent: u32,
    roots: Vec<Z2Polynomial>,
    logs: Vec<usize>,
}

impl FiniteField {
    pub fn new(exponent: u32) -> Self {
        assert!(exponent > 0 && exponent < Z2Polynomial::COEFFICIENT_COUNT / 2);

        let irreducible = Self::find_irreducible(exponent);
        debug!(
            "using irreducible polynomial {:#x} for GF(2^{exponent})",
            irreducible.coefficients()
        );

        let element_count = (1usize << exponent) - 1;
        let mut roots = vec![Z2Polynomial::default(); element_count];
        let mut logs = vec![0usize; element_count + 1];

        let mut alpha = 1u64;
        roots[0] = Z2Polynomial::new(1);
        for i in 1..element_count {
            alpha <<= 1;
            let reduced = Z2Polynomial::new(alpha) % irreducible;
            roots[i] = reduced;
            logs[reduced.coefficients() as usize] = i;
            alpha = reduced.coefficients();
        }

        Self {
            exponent,
            roots,
            logs,
        }
    }

    fn find_irreducible(exponent: u32) -> Z2Polynomial {
        let high_bit = 1u64 << exponent;
        'candidates: for low in 1..high_bit {
            let candidate = Z2Polynomial::new(high_bit | low);
            for divisor in 2..high_bit {
                if (candidate % Z2Polynomial::new(divisor)).is_zero() {
                    continue 'candidates;
                }
            }
            return candidate;
        }
        unreachable!("an irreducible polynomial of degree {exponent} exists");
    }

    pub fn element_count(&self) -> usize {
        self.roots.len()
    }

    pub fn roots(&self) -> &[Z2Polynomial] {
        &self.roots
    }

    /// The exponent e with alpha^e equal to `root`.
    pub fn root_exponent(&self, root: Z2Polynomial) -> usize {
        debug_assert!(root.degree() < self.exponent);
        self.logs[root.coefficients() as usize]
    }

    pub fn multiply(&self, a: Z2Polynomial, b: Z2Polynomial) -> Z2Polynomial {
        if a.is_zero() || b.is_zero() {
            return Z2Polynomial::default();
        }
        let exponent = self.root_exponent(a) + self.root_exponent(b);
        self.roots[exponent % self.element_count()]
    }

    pub fn power(&self, root: Z2Polynomial, exponent: usize) -> Z2Polynomial {
        if root.is_zero() {
            return Z2Polynomial::default();
        }
        let log = self.root_exponent(root);
        self.roots[(log * exponent) % self.element_count()]
    }

    pub fn power_of_x(&self, exponent: usize) -> Z2Polynomial {
        self.roots[exponent % self.element_count()]
    }

    pub fn inverse(&self, root: Z2Polynomial) -> Z2Polynomial {
        assert!(!root.is_zero());
        let log = self.root_exponent(root);
        self.roots[(self.element_count() - log) % self.element_count()]
    }

    /// Evaluate the received word at alpha^n: the n-th syndrome.
    pub fn syndrome(&self, word: Z2Polynomial, n: usize) -> Z2Polynomial {
        let mut result = Z2Polynomial::default();
        for exponent in word.exponents() {
            result += self.power_of_x(exponent as usize * n);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gf32_has_31_distinct_nonzero_elements() {
        let field = FiniteField::new(5);
        assert_eq!(field.element_count(), 31);
        let mut seen = std::collections::HashSet::new();
        for root in field.roots() {
            assert!(!root.is_zero());
            assert!(root.degree() < 5);
            assert!(seen.insert(root.coefficients()));
        }
    }

    #[test]
    fn logs_invert_the_root_table() {
        let field = FiniteField::new(5);
        for (i, &root) in field.roots().iter().enumerate() {
            assert_eq!(field.root_exponent(root), if i == 0 { 0 } else { i });
        }
    }

    #[test]
    fn multiplication_adds_exponents() {
        let field = FiniteField::new(5);
        let a = field.power_of_x(11);
        let b = field.power_of_x(27);
        assert_eq!(field.multiply(a, b), field.power_of_x(38 % 31));
    }

    #[test]
    fn inverse_multiplies_to_one() {
        let field = FiniteField::new(5);
        for &root in field.roots() {
            let product = field.multiply(root, field.inverse(root));
            assert_eq!(product.coefficients(), 1);
        }
    }

    #[test]
    fn syndromes_of_a_codeword_multiple_vanish() {
        // Any multiple of the generator has alpha^1..alpha^2t as roots for
        // the POCSAG generator polynomial.
        let field = FiniteField::new(5);
        let generator = Z2Polynomial::new(0b11101101001);
        let word = generator * Z2Polynomial::new(0b1011);
        for n in 1..=4 {
            assert!(field.syndrome(word, n).is_zero(), "syndrome {n} non-zero");
        }
    }
}
