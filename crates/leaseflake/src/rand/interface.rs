use std::sync::Arc;

/// A trait for random sources that return random integers.
///
/// Workers draw a fresh sequence seed from it whenever a new millisecond
/// begins. Tests plug in a fixed source to make sequences predictable.
///
/// # Example
/// ```
/// use leaseflake::RandSource;
///
/// struct FixedRand;
/// impl RandSource<u16> for FixedRand {
///     fn rand(&self) -> u16 {
///         1234
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.rand(), 1234);
/// ```
pub trait RandSource<T> {
    /// Returns a random integer.
    fn rand(&self) -> T;
}

impl<T, S> RandSource<T> for Arc<S>
where
    S: RandSource<T> + ?Sized,
{
    fn rand(&self) -> T {
        (**self).rand()
    }
}
