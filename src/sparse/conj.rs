use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Elementwise complex conjugation on the original sparsity pattern.
pub(crate) trait Conjugate {
    fn conjugate(&self) -> Self;
}

impl Conjugate for CscMatrix<Complex64> {
    fn conjugate(&self) -> Self {
        let values: Vec<_> = self.values().iter().map(|v| v.conj()).collect();
        CscMatrix::try_from_pattern_and_values(self.pattern().clone(), values)
            .expect("conjugation keeps the sparsity pattern")
    }
}

/// Splits a complex matrix into real and imaginary parts, both carrying
/// the original sparsity pattern (explicit zeros are kept so the two
/// halves stay index-compatible).
pub(crate) trait RealImag {
    type Real;

    fn real_imag(&self) -> (Self::Real, Self::Real);
}

impl RealImag for CscMatrix<Complex64> {
    type Real = CscMatrix<f64>;

    fn real_imag(&self) -> (Self::Real, Self::Real) {
        let re: Vec<_> = self.values().iter().map(|v| v.re).collect();
        let im: Vec<_> = self.values().iter().map(|v| v.im).collect();
        let real = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), re)
            .expect("real part keeps the sparsity pattern");
        let imag = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), im)
            .expect("imaginary part keeps the sparsity pattern");
        (real, imag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn sample() -> CscMatrix<Complex64> {
        let mut coo = CooMatrix::new(4, 4);
        coo.push(0, 0, Complex64::new(2.0, -3.0));
        coo.push(1, 0, Complex64::new(-1.0, 0.5));
        coo.push(2, 2, Complex64::new(0.0, 4.0));
        coo.push(3, 1, Complex64::new(7.0, 0.0));
        CscMatrix::from(&coo)
    }

    #[test]
    fn conjugate_flips_imaginary_parts() {
        let a = sample();
        let c = a.conjugate();
        assert_eq!(c.pattern(), a.pattern());
        for (orig, conj) in a.values().iter().zip(c.values()) {
            assert_eq!(conj.re, orig.re);
            assert_eq!(conj.im, -orig.im);
        }
    }

    #[test]
    fn real_imag_share_the_pattern() {
        let a = sample();
        let (re, im) = a.real_imag();
        assert_eq!(re.pattern(), a.pattern());
        assert_eq!(im.pattern(), a.pattern());
        assert_eq!(re.values(), &[2.0, -1.0, 7.0, 0.0]);
        assert_eq!(im.values(), &[-3.0, 0.5, 0.0, 4.0]);
    }
}
