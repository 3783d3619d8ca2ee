//! Runtime configuration for preservation runs.

use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const SETTLE_DELAY_VAR: &str = "PRESERVE_SETTLE_DELAY_MS";
const MAX_CONCURRENT_TASKS_VAR: &str = "PRESERVE_MAX_CONCURRENT_TASKS";

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservationConfig {
    settle_delay: Duration,
    max_concurrent_tasks: Option<NonZeroUsize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl PreservationConfig {
    /// 環境変数から読み込む。未設定の値はデフォルトを使う。
    ///
    /// # Errors
    /// 数値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// `from_env` の本体。テストでは環境変数の代わりにクロージャを渡す。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settle_delay = match lookup(SETTLE_DELAY_VAR) {
            Some(raw) => Duration::from_millis(parse(SETTLE_DELAY_VAR, &raw)?),
            None => DEFAULT_SETTLE_DELAY,
        };

        // 空文字 / 0 は上限なし
        let max_concurrent_tasks = match lookup(MAX_CONCURRENT_TASKS_VAR) {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => NonZeroUsize::new(parse(MAX_CONCURRENT_TASKS_VAR, &raw)?),
            None => None,
        };

        Ok(Self {
            settle_delay,
            max_concurrent_tasks,
        })
    }

    /// Wait before the confirmatory read after a submit.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Cap on tasks running at once within one job. `None` = unbounded.
    pub fn max_concurrent_tasks(&self) -> Option<NonZeroUsize> {
        self.max_concurrent_tasks
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: Option<NonZeroUsize>) -> Self {
        self.max_concurrent_tasks = max;
        self
    }
}

impl Default for PreservationConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_concurrent_tasks: None,
        }
    }
}

fn parse<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PreservationConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PreservationConfig::default());
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.max_concurrent_tasks(), None);
    }

    #[rstest]
    #[case::zero("0", None)]
    #[case::blank("", None)]
    #[case::four("4", NonZeroUsize::new(4))]
    #[case::padded(" 8 ", NonZeroUsize::new(8))]
    fn max_concurrent_tasks_parsing(#[case] raw: &str, #[case] expected: Option<NonZeroUsize>) {
        let config =
            PreservationConfig::from_lookup(lookup(&[(MAX_CONCURRENT_TASKS_VAR, raw)])).unwrap();
        assert_eq!(config.max_concurrent_tasks(), expected);
    }

    #[test]
    fn settle_delay_from_millis() {
        let config = PreservationConfig::from_lookup(lookup(&[(SETTLE_DELAY_VAR, "250")])).unwrap();
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
    }

    #[rstest]
    #[case::negative("-1")]
    #[case::beyond_usize("99999999999999999999999")]
    #[case::word("many")]
    fn out_of_range_task_cap_is_reported(#[case] raw: &str) {
        let err = PreservationConfig::from_lookup(lookup(&[(MAX_CONCURRENT_TASKS_VAR, raw)]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: MAX_CONCURRENT_TASKS_VAR, ref value } if value == raw
        ));
    }

    #[test]
    fn invalid_number_is_reported() {
        let err =
            PreservationConfig::from_lookup(lookup(&[(SETTLE_DELAY_VAR, "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: SETTLE_DELAY_VAR, ref value } if value == "soon"
        ));
    }
}
