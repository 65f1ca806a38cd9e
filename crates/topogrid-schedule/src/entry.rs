//! Schedule entries — one timed action each.
//!
//! `start_time` is seconds relative to the instantiation boundary:
//! negative values run during configuration (before the experiment
//! starts), zero is the boundary itself, positive values run afterwards.
//! `-inf` and `+inf` are legal and order before/after everything else.

use std::path::Path;

use tracing::warn;

use topo_core::OsFamily;

use crate::content::Content;
use crate::error::{ScheduleError, ScheduleResult};
use crate::transport::{Arguments, DataItem, PauseSpec, TransportEntry};

/// Interval used by repeating file transfers when none is given.
pub const DEFAULT_TRANSFER_INTERVAL: f64 = 60.0;
/// Start time of repeating file transfers when none is given.
pub const DEFAULT_TRANSFER_START: f64 = 1.0;
/// Start time of one-shot file transfers when none is given.
pub const DEFAULT_TRANSFER_ONCE_START: f64 = -1.0;

/// Guest directory that preloaded content is staged in before the move.
pub const STAGING_DIR: &str = "preloaded_content";

/// Discriminant of a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    RunExecutable,
    DropContent,
    DropFile,
    FileTransfer,
    Pause,
}

/// A file loaded alongside an executable before it runs.
#[derive(Debug)]
pub enum Attachment {
    Content {
        location: String,
        content: Content,
        executable: bool,
    },
    File {
        location: String,
        filename: String,
        executable: bool,
    },
}

/// Kind-specific data of an entry.
#[derive(Debug)]
pub enum Payload {
    RunExecutable {
        program: String,
        arguments: Option<Arguments>,
        attachments: Vec<Attachment>,
    },
    DropContent {
        location: String,
        content: Content,
        executable: bool,
    },
    DropFile {
        location: String,
        filename: String,
        executable: bool,
    },
    FileTransfer {
        location: String,
        interval: Option<f64>,
        destination: Option<String>,
        only_if_changed: bool,
    },
    Pause {
        duration: f64,
    },
}

/// One timed action on a node.
#[derive(Debug)]
pub struct ScheduleEntry {
    start_time: f64,
    payload: Payload,
    materialized: bool,
}

impl ScheduleEntry {
    fn new(start_time: f64, payload: Payload) -> ScheduleResult<Self> {
        if start_time.is_nan() {
            return Err(ScheduleError::InvalidStartTime(start_time));
        }
        let materialized = !payload_has_pending_content(&payload);
        Ok(Self {
            start_time,
            payload,
            materialized,
        })
    }

    // ── Constructors ───────────────────────────────────────────

    /// Run `program` with optional arguments.
    ///
    /// When `is_resource` is set the program is itself a resource file and
    /// is loaded into the guest (executable) before it is invoked.
    pub fn run_executable(
        start_time: f64,
        program: &str,
        arguments: Option<Arguments>,
        is_resource: bool,
    ) -> ScheduleResult<Self> {
        let mut attachments = Vec::new();
        if is_resource {
            attachments.push(Attachment::File {
                location: program.to_string(),
                filename: program.to_string(),
                executable: true,
            });
        }
        Self::new(
            start_time,
            Payload::RunExecutable {
                program: program.to_string(),
                arguments,
                attachments,
            },
        )
    }

    /// Write `content` to `location` in the guest.
    pub fn drop_content(
        start_time: f64,
        location: &str,
        content: Content,
        executable: bool,
    ) -> ScheduleResult<Self> {
        warn_without_extension(location);
        Self::new(
            start_time,
            Payload::DropContent {
                location: location.to_string(),
                content,
                executable,
            },
        )
    }

    /// Write `content` to a staging path and move it into place.
    ///
    /// Both entries share `start_time`; the write precedes the move in
    /// insertion order.
    pub fn preloaded_content(
        start_time: f64,
        location: &str,
        content: Content,
        executable: bool,
        os: OsFamily,
    ) -> ScheduleResult<[Self; 2]> {
        warn_without_extension(location);
        let staging = staging_path(location, os);
        let write = Self::new(
            start_time,
            Payload::DropContent {
                location: staging.clone(),
                content,
                executable,
            },
        )?;
        let relocate = Self::move_into_place(start_time, &staging, location, os)?;
        Ok([write, relocate])
    }

    /// Copy the resource file `filename` to `location` in the guest.
    pub fn drop_file(
        start_time: f64,
        location: &str,
        filename: &str,
        executable: bool,
    ) -> ScheduleResult<Self> {
        warn_without_extension(location);
        Self::new(
            start_time,
            Payload::DropFile {
                location: location.to_string(),
                filename: filename.to_string(),
                executable,
            },
        )
    }

    /// Copy `filename` to a staging path and move it into place.
    pub fn preloaded_file(
        start_time: f64,
        location: &str,
        filename: &str,
        executable: bool,
        os: OsFamily,
    ) -> ScheduleResult<[Self; 2]> {
        warn_without_extension(location);
        let staging = staging_path(location, os);
        let copy = Self::new(
            start_time,
            Payload::DropFile {
                location: staging.clone(),
                filename: filename.to_string(),
                executable,
            },
        )?;
        let relocate = Self::move_into_place(start_time, &staging, location, os)?;
        Ok([copy, relocate])
    }

    /// Pull `location` out of the guest.
    ///
    /// `interval = None` extracts once; otherwise the file is pulled every
    /// `interval` seconds. With `only_if_changed` the agent skips files whose
    /// content has not changed since the last pull.
    pub fn file_transfer(
        location: &str,
        interval: Option<f64>,
        start_time: f64,
        destination: Option<&str>,
        only_if_changed: bool,
    ) -> ScheduleResult<Self> {
        if let Some(interval) = interval {
            if interval.is_nan() || interval <= 0.0 {
                return Err(ScheduleError::InvalidTransferInterval(interval));
            }
        }
        Self::new(
            start_time,
            Payload::FileTransfer {
                location: location.to_string(),
                interval,
                destination: destination.map(str::to_string),
                only_if_changed,
            },
        )
    }

    /// Halt the node's schedule for `duration` seconds.
    ///
    /// `start_time` must be non-negative or exactly `-inf`; `0` is moved just
    /// past the instantiation boundary. `duration = +inf` waits for an
    /// external resume.
    pub fn pause(start_time: f64, duration: f64) -> ScheduleResult<Self> {
        if start_time.is_nan() || (start_time < 0.0 && start_time != f64::NEG_INFINITY) {
            return Err(ScheduleError::InvalidStartTime(start_time));
        }
        if duration.is_nan() || duration < 0.0 {
            return Err(ScheduleError::InvalidPauseDuration(duration));
        }
        if duration == 0.0 {
            warn!(start_time, "pause with zero duration has no effect");
        }
        let start_time = if start_time == 0.0 {
            f64::MIN_POSITIVE
        } else {
            start_time
        };
        Self::new(start_time, Payload::Pause { duration })
    }

    /// A pause that lasts until externally resumed.
    pub fn breakpoint(start_time: f64) -> ScheduleResult<Self> {
        Self::pause(start_time, f64::INFINITY)
    }

    /// Three-artifact resource invocation.
    ///
    /// Loads `name` and invokes it with positional arguments
    /// `[dynamic, static, reboot]`, where the first two are the staged file
    /// names or `"None"` when absent.
    pub fn vm_resource(
        start_time: f64,
        name: &str,
        dynamic: Option<Content>,
        static_file: Option<&str>,
    ) -> ScheduleResult<Self> {
        let mut attachments = vec![Attachment::File {
            location: name.to_string(),
            filename: name.to_string(),
            executable: true,
        }];
        let dynamic_arg = match dynamic {
            Some(content) => {
                attachments.push(Attachment::Content {
                    location: "dynamic".to_string(),
                    content,
                    executable: false,
                });
                "dynamic".to_string()
            }
            None => "None".to_string(),
        };
        let static_arg = match static_file {
            Some(filename) => {
                attachments.push(Attachment::File {
                    location: filename.to_string(),
                    filename: filename.to_string(),
                    executable: false,
                });
                filename.to_string()
            }
            None => "None".to_string(),
        };
        Self::new(
            start_time,
            Payload::RunExecutable {
                program: name.to_string(),
                arguments: Some(Arguments::List(vec![
                    dynamic_arg,
                    static_arg,
                    "reboot".to_string(),
                ])),
                attachments,
            },
        )
    }

    fn move_into_place(
        start_time: f64,
        staging: &str,
        location: &str,
        os: OsFamily,
    ) -> ScheduleResult<Self> {
        Self::run_executable(
            start_time,
            os.move_command(),
            Some(Arguments::List(vec![staging.to_string(), location.to_string()])),
            false,
        )
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn kind(&self) -> EntryKind {
        match self.payload {
            Payload::RunExecutable { .. } => EntryKind::RunExecutable,
            Payload::DropContent { .. } => EntryKind::DropContent,
            Payload::DropFile { .. } => EntryKind::DropFile,
            Payload::FileTransfer { .. } => EntryKind::FileTransfer,
            Payload::Pause { .. } => EntryKind::Pause,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// True once every piece of deferred content has been generated.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// True for a pause that never ends on its own.
    pub fn is_break(&self) -> bool {
        matches!(self.payload, Payload::Pause { duration } if duration == f64::INFINITY)
    }

    /// Resource file names this entry needs copied into the guest.
    pub fn required_files(&self) -> Vec<&str> {
        match &self.payload {
            Payload::DropFile { filename, .. } => vec![filename.as_str()],
            Payload::RunExecutable { attachments, .. } => attachments
                .iter()
                .filter_map(|a| match a {
                    Attachment::File { filename, .. } => Some(filename.as_str()),
                    Attachment::Content { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    // ── Resolution & transport ─────────────────────────────────

    /// Generate deferred content. Returns how many generators ran.
    pub(crate) fn resolve(&mut self) -> ScheduleResult<usize> {
        if self.materialized {
            return Ok(0);
        }
        let mut invoked = 0;
        match &mut self.payload {
            Payload::DropContent {
                location, content, ..
            } => {
                invoked += usize::from(content.resolve(location.as_str())?);
            }
            Payload::RunExecutable { attachments, .. } => {
                for attachment in attachments.iter_mut() {
                    if let Attachment::Content {
                        location, content, ..
                    } = attachment
                    {
                        invoked += usize::from(content.resolve(location.as_str())?);
                    }
                }
            }
            _ => {}
        }
        self.materialized = true;
        Ok(invoked)
    }

    /// Normalize into the uniform transport record.
    pub fn to_transport(&self) -> ScheduleResult<TransportEntry> {
        let mut entry = TransportEntry {
            start_time: self.start_time,
            executable: None,
            arguments: None,
            data: Vec::new(),
            pause: None,
        };
        match &self.payload {
            Payload::RunExecutable {
                program,
                arguments,
                attachments,
            } => {
                entry.executable = Some(program.clone());
                entry.arguments = arguments.clone();
                for attachment in attachments {
                    entry.data.push(attachment_item(attachment)?);
                }
            }
            Payload::DropContent {
                location,
                content,
                executable,
            } => {
                entry.data.push(content_item(location, content, *executable)?);
            }
            Payload::DropFile {
                location,
                filename,
                executable,
            } => {
                entry.data.push(DataItem::File {
                    location: location.clone(),
                    filename: filename.clone(),
                    executable: *executable,
                });
            }
            Payload::FileTransfer {
                location,
                interval,
                destination,
                only_if_changed,
            } => {
                entry.data.push(DataItem::Transfer {
                    location: location.clone(),
                    interval: *interval,
                    destination: destination.clone(),
                    only_if_changed: *only_if_changed,
                });
            }
            Payload::Pause { duration } => {
                entry.pause = Some(PauseSpec {
                    duration: *duration,
                });
            }
        }
        Ok(entry)
    }
}

fn payload_has_pending_content(payload: &Payload) -> bool {
    match payload {
        Payload::DropContent { content, .. } => !content.is_resolved(),
        Payload::RunExecutable { attachments, .. } => attachments.iter().any(|a| {
            matches!(a, Attachment::Content { content, .. } if !content.is_resolved())
        }),
        _ => false,
    }
}

fn attachment_item(attachment: &Attachment) -> ScheduleResult<DataItem> {
    match attachment {
        Attachment::Content {
            location,
            content,
            executable,
        } => content_item(location, content, *executable),
        Attachment::File {
            location,
            filename,
            executable,
        } => Ok(DataItem::File {
            location: location.clone(),
            filename: filename.clone(),
            executable: *executable,
        }),
    }
}

fn content_item(location: &str, content: &Content, executable: bool) -> ScheduleResult<DataItem> {
    match content {
        Content::Literal(text) => Ok(DataItem::Content {
            location: location.to_string(),
            content: text.clone(),
            executable,
        }),
        Content::Failed(reason) => Err(ScheduleError::ContentGeneration {
            location: location.to_string(),
            reason: reason.clone(),
        }),
        Content::Deferred(_) => Err(ScheduleError::Unresolved {
            location: location.to_string(),
        }),
    }
}

/// Deterministic staging location for a preloaded destination.
///
/// Rooted, drive-qualified and relative destinations stage under separate
/// subdirectories so that `/a/b`, `C:\a\b` and `a/b` never share a path.
fn staging_path(location: &str, os: OsFamily) -> String {
    let normalized = location.replace('\\', "/");
    let (anchor, rest) = match normalized.split_once(':') {
        Some((drive, rest)) if !drive.is_empty() && !drive.contains('/') => {
            ("drive", format!("{drive}/{rest}"))
        }
        _ if normalized.starts_with('/') => ("root", normalized.clone()),
        _ => ("relative", normalized.clone()),
    };
    let relative = rest.replace("//", "/");
    let relative = relative.trim_start_matches('/');
    match os {
        OsFamily::Unix => format!("{STAGING_DIR}/{anchor}/{relative}"),
        OsFamily::Windows => format!(
            "{STAGING_DIR}\\{anchor}\\{}",
            relative.replace('/', "\\")
        ),
    }
}

fn warn_without_extension(location: &str) {
    let file_name = location.rsplit(['/', '\\']).next().unwrap_or(location);
    if Path::new(file_name).extension().is_none() {
        warn!(%location, "destination has no file extension; the guest may not recognize the file type");
    }
}
