//! A thin wrapper around [`eyre`] that renders error reports as a single
//! line, with the outermost context first and every cause appended after
//! a `: ` separator. Single-line reports keep multi-layer errors greppable
//! in structured log output.

use std::error::Error;

pub use eyre;
#[doc(hidden)]
pub use eyre::Result;

/// Installs the swell-eyre hook as the global error report hook.
///
/// Must be called before any `eyre::Report` is constructed, otherwise the
/// default handler takes over.
///
/// # Errors
///
/// Returns an error if another handler was installed first.
pub fn install() -> Result<()> {
    eyre::set_hook(Box::new(|_| Box::new(ErrorHandler)))?;
    Ok(())
}

struct ErrorHandler;

impl eyre::EyreHandler for ErrorHandler {
    fn debug(
        &self,
        error: &(dyn Error + 'static),
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        write_chain(error, f)
    }

    fn display(
        &self,
        error: &(dyn Error + 'static),
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        write_chain(error, f)
    }
}

fn write_chain(
    mut error: &(dyn Error + 'static),
    f: &mut core::fmt::Formatter<'_>,
) -> core::fmt::Result {
    write!(f, "{error}")?;
    while let Some(cause) = error.source() {
        write!(f, ": {cause}")?;
        error = cause;
    }
    Ok(())
}
