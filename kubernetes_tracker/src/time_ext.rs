use std::sync::OnceLock;

pub trait OffsetDateTimeExt {
    /// Convenience method that calls [`time::OffsetDateTime::to_offset`] with the return value of [`local_offset`].
    fn to_local(self) -> time::Result<time::OffsetDateTime>;
}

/// Returns the local offset, determined upon the first call. The first call may have to be made before the program
/// spawns threads. Browse the source code of [`time::UtcOffset::current_local_offset`] to understand why.
pub fn local_offset() -> Result<time::UtcOffset, time::error::IndeterminateOffset> {
    static CACHE: OnceLock<Result<time::UtcOffset, time::error::IndeterminateOffset>> =
        OnceLock::new();
    *CACHE.get_or_init(time::UtcOffset::current_local_offset)
}

impl OffsetDateTimeExt for time::OffsetDateTime {
    fn to_local(self) -> time::Result<time::OffsetDateTime> {
        Ok(self.to_offset(local_offset()?))
    }
}

/// Formats a timestamp in local time, falling back to UTC when the local offset can not be determined.
pub fn format_local(value: time::OffsetDateTime) -> Result<String, time::error::Format> {
    let fd = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
    );
    value.to_local().unwrap_or(value).format(fd)
}
