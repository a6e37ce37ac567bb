use eyre::{Report, eyre};

pub fn make_eyre_error(message: String) -> Report {
  eyre!(message)
}

/// Returns an `Err(Report)` built from a format string. Use for
/// configuration and input errors surfaced to the user.
#[macro_export]
macro_rules! make_error {
  ($($arg:tt)*) => {
    core::result::Result::Err($crate::utils::error::make_eyre_error(format!($($arg)*)))
  };
}

/// Like `make_error!`, but marks conditions that indicate a bug rather than
/// bad input.
#[macro_export]
macro_rules! make_internal_error {
  ($($arg:tt)*) => {{
    let message = format!($($arg)*);
    core::result::Result::Err($crate::utils::error::make_eyre_error(format!("internal: {message}")))
  }};
}
