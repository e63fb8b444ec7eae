use std::ffi::OsString;
use std::path::PathBuf;

use crate::store::ViewMode;

/// What the editor was asked to show at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// `None` means use the configured default.
    pub view_mode: Option<ViewMode>,
    pub path: Option<PathBuf>,
}

/// Parse startup arguments (without the program name).
///
/// `-r`/`--rich` and `-m`/`--markdown` pick the view mode, the last one
/// winning. The first other argument is the file to open; the rest are
/// ignored.
pub fn parse_launch_options<I, S>(args: I) -> LaunchOptions
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut options = LaunchOptions::default();

    for arg in args {
        let arg = arg.into();
        if arg == "-r" || arg == "--rich" {
            options.view_mode = Some(ViewMode::Rich);
            continue;
        }
        if arg == "-m" || arg == "--markdown" {
            options.view_mode = Some(ViewMode::Plain);
            continue;
        }

        if options.path.is_none() {
            options.path = Some(PathBuf::from(arg));
        }
    }

    options
}
