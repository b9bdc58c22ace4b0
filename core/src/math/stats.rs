pub struct StatsHelper;

impl StatsHelper {
    /// Minimum and maximum over the finite values, `None` when there are none.
    pub fn finite_extent<I>(values: I) -> Option<(f64, f64)>
    where
        I: IntoIterator<Item = f64>,
    {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |extent, v| match extent {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
