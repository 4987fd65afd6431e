//! Numeric cell types a raster may hold

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// COG tiles are decoded straight into the requested element type, so
/// every sample format the reader understands must be castable into `Self`.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Fill value used for cells no tile covered
    fn fill_value() -> Self;

    /// Whether this value marks a missing cell, given the declared nodata
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Lossy conversion to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_integer_element {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn fill_value() -> Self {
                    0
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    nodata.is_some_and(|nd| *self == nd)
                }
            }
        )*
    };
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {
        $(
            impl RasterElement for $t {
                fn fill_value() -> Self {
                    <$t>::NAN
                }

                fn is_nodata(&self, nodata: Option<Self>) -> bool {
                    self.is_nan() || nodata.is_some_and(|nd| *self == nd)
                }
            }
        )*
    };
}

impl_integer_element!(i8, i16, i32, u8, u16, u32);
impl_float_element!(f32, f64);
