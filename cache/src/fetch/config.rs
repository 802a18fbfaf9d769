use std::time::Duration;

/// Per-coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FetchConfig {
  /// Raise the long-operation flags once an attempt has been in flight this
  /// long. `None` disables the alert.
  pub long_operation_alert: Option<Duration>,
  /// Refetch when the host reports that it became visible again.
  pub revalidate_on_focus: bool,
  /// Suppress all production while set.
  pub skip: bool,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      long_operation_alert: None,
      revalidate_on_focus: true,
      skip: false,
    }
  }
}
