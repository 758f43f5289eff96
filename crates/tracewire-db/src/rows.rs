//! Rows-affected extraction from statement results

/// A statement result that knows how many rows it touched
///
/// `-1` means unknown.
pub trait RowCount {
    /// Rows affected or returned
    fn row_count(&self) -> i64;
}

impl RowCount for () {
    fn row_count(&self) -> i64 {
        -1
    }
}

impl RowCount for u64 {
    fn row_count(&self) -> i64 {
        i64::try_from(*self).unwrap_or(i64::MAX)
    }
}

impl RowCount for usize {
    fn row_count(&self) -> i64 {
        i64::try_from(*self).unwrap_or(i64::MAX)
    }
}

impl RowCount for i64 {
    fn row_count(&self) -> i64 {
        *self
    }
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> i64 {
        self.len().row_count()
    }
}

impl<T> RowCount for Option<T> {
    fn row_count(&self) -> i64 {
        i64::from(self.is_some())
    }
}
