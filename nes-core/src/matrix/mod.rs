//! Dense row-major matrices over `f32` or `f64`.
//!
//! Every operation returns a fresh matrix; neither the receiver nor the
//! argument is ever modified.  Shape violations are programmer errors and
//! panic immediately.

use std::fmt::Debug;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

// Scales the max before subtracting it within softmax
const SOFTMAX_SCALE: f64 = 1.0 - 1e-300;

/// Floating point element type for engine matrices.  Implemented for `f32` and `f64`.
pub trait Float:
    Copy
    + Debug
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
{
    /// Additive identity
    fn zero() -> Self;

    /// Multiplicative identity
    fn one() -> Self;

    /// Lossy conversion from f64
    fn from_f64(v: f64) -> Self;

    /// Widening conversion to f64
    fn to_f64(self) -> f64;

    /// e^self
    fn exp(self) -> Self;

    /// Natural log
    fn ln(self) -> Self;

    /// Square root
    fn sqrt(self) -> Self;

    /// Absolute value
    fn abs(self) -> Self;

    /// False for NaN and the infinities
    fn is_finite(self) -> bool;
}

macro_rules! impl_float {
    ($t:ty) => {
        impl Float for $t {
            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn one() -> Self {
                1.0
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$t>::ln(self)
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

#[inline]
fn dot<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter().zip(y).map(|(a, b)| *a * *b).sum()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// Dense matrix stored row-major
pub struct Matrix<T> {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Row-major elements; always `rows * cols` long
    pub data: Vec<T>,
}

impl<T: Float> Matrix<T> {
    /// Wraps `data` as a `rows x cols` matrix
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "{}x{} matrix needs {} elements",
            rows,
            cols,
            rows * cols
        );
        Matrix { rows, cols, data }
    }

    /// All zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix::new(rows, cols, vec![T::zero(); rows * cols])
    }

    /// Square identity matrix
    pub fn identity(size: usize) -> Self {
        let mut data = vec![T::zero(); size * size];
        for i in 0..size {
            data[i * size + i] = T::one();
        }
        Matrix::new(size, size, data)
    }

    /// A `1 x n` row vector
    pub fn row(data: Vec<T>) -> Self {
        let n = data.len();
        Matrix::new(1, n, data)
    }

    /// A `n x 1` column vector
    pub fn column(data: Vec<T>) -> Self {
        let n = data.len();
        Matrix::new(n, 1, data)
    }

    /// Stacks equal length rows
    pub fn from_rows(rows: &[Vec<T>]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            assert_eq!(r.len(), cols, "ragged rows");
            data.extend_from_slice(r);
        }
        Matrix::new(rows.len(), cols, data)
    }

    #[inline]
    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    /// Element at row `r`, column `c`
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[r * self.cols + c]
    }

    #[inline]
    /// Underlying row-major data
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consumes the matrix, returning its data
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Computes `self * other^T`: entry (i, j) is the dot product of row i of self
    /// and row j of other, yielding a `self.rows x other.rows` matrix.
    pub fn multiply_transpose(&self, other: &Matrix<T>) -> Matrix<T> {
        assert_eq!(
            self.cols, other.cols,
            "multiply_transpose: {:?} incompatible with {:?}",
            self.shape(),
            other.shape()
        );
        let mut data = Vec::with_capacity(self.rows * other.rows);
        for i in 0..self.rows {
            let m = &self.data[i * self.cols..(i + 1) * self.cols];
            for j in 0..other.rows {
                data.push(dot(m, &other.data[j * other.cols..(j + 1) * other.cols]));
            }
        }
        Matrix::new(self.rows, other.rows, data)
    }

    // Elementwise op, repeating the shorter operand.  Empty broadcasts over empty.
    fn broadcast<F>(&self, other: &Matrix<T>, name: &str, f: F) -> Matrix<T>
    where
        F: Fn(T, T) -> T,
    {
        let (lena, lenb) = (self.data.len(), other.data.len());
        assert!(
            lena == 0 || (lenb > 0 && lena % lenb == 0),
            "{}: {:?} cannot broadcast {:?}",
            name,
            self.shape(),
            other.shape()
        );
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, v)| f(*v, other.data[i % lenb]))
            .collect();
        Matrix::new(self.rows, self.cols, data)
    }

    /// Elementwise sum
    pub fn add(&self, other: &Matrix<T>) -> Matrix<T> {
        self.broadcast(other, "add", |a, b| a + b)
    }

    /// Elementwise difference
    pub fn subtract(&self, other: &Matrix<T>) -> Matrix<T> {
        self.broadcast(other, "subtract", |a, b| a - b)
    }

    /// Elementwise product
    pub fn hadamard(&self, other: &Matrix<T>) -> Matrix<T> {
        self.broadcast(other, "hadamard", |a, b| a * b)
    }

    /// Multiplies every element by `s`
    pub fn scale(&self, s: T) -> Matrix<T> {
        self.map(|v| v * s)
    }

    /// Applies `f` to every element
    pub fn map<F: Fn(T) -> T>(&self, f: F) -> Matrix<T> {
        Matrix::new(self.rows, self.cols, self.data.iter().map(|v| f(*v)).collect())
    }

    /// Swaps rows and columns
    pub fn transpose(&self) -> Matrix<T> {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.data[r * self.cols + c]);
            }
        }
        Matrix::new(self.cols, self.rows, data)
    }

    /// Logistic function of every element
    pub fn sigmoid(&self) -> Matrix<T> {
        self.map(|v| T::one() / (T::one() + (-v).exp()))
    }

    /// Row-wise softmax with temperature `t`
    pub fn softmax(&self, t: T) -> Matrix<T> {
        let mut max = T::zero();
        for v in self.data.iter() {
            let v = *v / t;
            if v > max {
                max = v;
            }
        }
        let s = max * T::from_f64(SOFTMAX_SCALE);

        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(self.cols.max(1)) {
            let values: Vec<T> = row.iter().map(|v| (*v / t - s).exp()).collect();
            let sum: T = values.iter().copied().sum();
            data.extend(values.into_iter().map(|v| v / sum));
        }
        Matrix::new(self.rows, self.cols, data)
    }

    /// Row-wise entropy, `-Σ p ln p`, as a `rows x 1` column
    pub fn entropy(&self) -> Matrix<T> {
        let data = self
            .data
            .chunks(self.cols.max(1))
            .map(|row| -row.iter().map(|p| *p * p.ln()).sum::<T>())
            .collect();
        Matrix::new(self.rows, 1, data)
    }

    /// Sums the rows together into a `1 x cols` row
    pub fn sum(&self) -> Matrix<T> {
        let mut data = vec![T::zero(); self.cols];
        for row in self.data.chunks(self.cols.max(1)) {
            for (acc, v) in data.iter_mut().zip(row) {
                *acc += *v;
            }
        }
        Matrix::new(1, self.cols, data)
    }

    /// Sum of every squared element
    pub fn sum_squares(&self) -> T {
        self.data.iter().map(|v| *v * *v).sum()
    }

    /// Largest absolute element; zero for an empty matrix
    pub fn max_abs(&self) -> T {
        self.data
            .iter()
            .fold(T::zero(), |acc, v| if v.abs() > acc { v.abs() } else { acc })
    }
}
