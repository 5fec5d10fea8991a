use crate::settings::LogLevelName;
use tracing::level_filters::LevelFilter;

/// Maps a level name (including the `WARN`/`FATAL` aliases) to a filter, defaulting to `INFO`.
#[must_use]
pub fn level_filter_for(name: &str) -> LevelFilter {
    name.parse::<LogLevelName>().map_or(LevelFilter::INFO, LogLevelName::level_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_for() {
        assert_eq!(level_filter_for("WARN"), LevelFilter::WARN);
        assert_eq!(level_filter_for("fatal"), LevelFilter::ERROR);
        assert_eq!(level_filter_for("debug"), LevelFilter::DEBUG);
        assert_eq!(level_filter_for("verbose"), LevelFilter::INFO);
        assert_eq!(level_filter_for(""), LevelFilter::INFO);
    }
}
