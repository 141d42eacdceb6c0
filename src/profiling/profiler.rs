//! Chrome Trace ("flame style") profiling.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   particle_store::profiling::init("profile/trace.json");
//!   {
//!     let _g = particle_store::profiling::span("rebuild/packed");
//!     // migrate and rebuild...
//!   }
//!   particle_store::profiling::shutdown();

use std::borrow::Cow;
use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::fmt::Write as _;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    use super::*;

    /// A Chrome trace "complete event" (`ph:"X"`) or a thread-name
    /// metadata event (`ph:"M"`).
    #[derive(Debug)]
    enum TraceEvent {
        Complete {
            name: String,
            ts_us: u64,
            dur_us: u64,
            tid: u64,
            args: Vec<(String, Arg)>,
        },
        ThreadName {
            ts_us: u64,
            tid: u64,
            name: String,
        },
    }

    impl TraceEvent {
        fn render(&self, out: &mut String) {
            match self {
                TraceEvent::Complete {
                    name,
                    ts_us,
                    dur_us,
                    tid,
                    args,
                } => {
                    out.push_str("{\"name\":");
                    push_json_str(out, name);
                    let _ = write!(
                        out,
                        ",\"cat\":\"rebuild\",\"ph\":\"X\",\"ts\":{ts_us},\
                         \"dur\":{dur_us},\"pid\":1,\"tid\":{tid}"
                    );
                    if !args.is_empty() {
                        out.push_str(",\"args\":{");
                        for (i, (key, value)) in args.iter().enumerate() {
                            if i > 0 {
                                out.push(',');
                            }
                            push_json_str(out, key);
                            out.push(':');
                            value.render(out);
                        }
                        out.push('}');
                    }
                    out.push('}');
                }
                TraceEvent::ThreadName { ts_us, tid, name } => {
                    let _ = write!(
                        out,
                        "{{\"name\":\"thread_name\",\"ph\":\"M\",\"ts\":{ts_us},\
                         \"pid\":1,\"tid\":{tid},\"args\":{{\"name\":"
                    );
                    push_json_str(out, name);
                    out.push_str("}}");
                }
            }
        }
    }

    impl Arg {
        fn render(&self, out: &mut String) {
            match self {
                Arg::Str(s) => push_json_str(out, s),
                Arg::U64(v) => {
                    let _ = write!(out, "{v}");
                }
                Arg::I64(v) => {
                    let _ = write!(out, "{v}");
                }
                // NaN and infinities are not valid JSON numbers.
                Arg::F64(v) if v.is_finite() => {
                    let _ = write!(out, "{v}");
                }
                Arg::F64(v) => push_json_str(out, &v.to_string()),
                Arg::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            }
        }
    }

    fn push_json_str(out: &mut String, s: &str) {
        out.push('"');
        for ch in s.chars() {
            match ch {
                '"' | '\\' => {
                    out.push('\\');
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
                c => out.push(c),
            }
        }
        out.push('"');
    }

    struct ProfilerState {
        start: Instant,
        out_path: PathBuf,
        is_on: AtomicBool,
        events: Mutex<Vec<TraceEvent>>,
    }

    static STATE: OnceLock<ProfilerState> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    fn tid() -> u64 {
        TID.with(|t| *t)
    }

    /// Initialize the profiler and set the output path.
    pub fn init<P: AsRef<Path>>(path: P) {
        let _ = STATE.set(ProfilerState {
            start: Instant::now(),
            out_path: path.as_ref().to_path_buf(),
            is_on: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Shut down the profiler and write the Chrome Trace JSON.
    pub fn shutdown() {
        if let Some(st) = STATE.get() {
            // Stop accepting new events; spans already in flight may still push.
            st.is_on.store(false, Ordering::Release);

            if let Err(e) = write_trace_file(st) {
                eprintln!("profiling::shutdown failed to write trace: {e}");
            }
        }
    }

    fn write_trace_file(st: &ProfilerState) -> std::io::Result<()> {
        let events = {
            let mut guard = st.events.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut body = String::with_capacity(events.len() * 96 + 32);
        body.push_str("{\"traceEvents\":[");
        for (i, ev) in events.iter().enumerate() {
            if i > 0 {
                body.push(',');
            }
            ev.render(&mut body);
        }
        body.push_str("]}");

        if let Some(parent) = st.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&st.out_path, body)
    }

    fn push_event(ev: TraceEvent) {
        if let Some(st) = STATE.get() {
            if st.is_on.load(Ordering::Acquire) {
                st.events
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(ev);
            }
        }
    }

    /// Assign a human-friendly thread name (shown in Perfetto/Chrome tracing).
    pub fn thread_name(name: impl Into<String>) {
        let st = match STATE.get() {
            Some(s) => s,
            None => return,
        };
        push_event(TraceEvent::ThreadName {
            ts_us: st.start.elapsed().as_micros() as u64,
            tid: tid(),
            name: name.into(),
        });
    }

    /// Create a profiling span.
    pub fn span(name: impl Into<super::SpanName>) -> SpanGuard {
        let open = STATE
            .get()
            .filter(|st| st.is_on.load(Ordering::Acquire))
            .map(|st| OpenSpan {
                name: name.into().0.into_owned(),
                ts0: st.start.elapsed().as_micros() as u64,
                tid: tid(),
                args: Vec::new(),
            });
        SpanGuard(open)
    }

    struct OpenSpan {
        name: String,
        ts0: u64,
        tid: u64,
        args: Vec<(String, Arg)>,
    }

    /// A RAII guard that records a Chrome Trace complete event on drop.
    ///
    /// Holds `None` when the profiler is uninitialized or already shut
    /// down, in which case drop is a no-op.
    pub struct SpanGuard(Option<OpenSpan>);

    impl SpanGuard {
        /// Attach an argument to this span (builder-style).
        #[inline]
        pub fn arg(mut self, key: impl Into<String>, value: Arg) -> Self {
            if let Some(open) = self.0.as_mut() {
                open.args.push((key.into(), value));
            }
            self
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let open = match self.0.take() {
                Some(open) => open,
                None => return,
            };
            let end = match STATE.get() {
                Some(st) => st.start.elapsed().as_micros() as u64,
                None => return,
            };
            push_event(TraceEvent::Complete {
                name: open.name,
                ts_us: open.ts0,
                dur_us: end.saturating_sub(open.ts0),
                tid: open.tid,
                args: open.args,
            });
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Initialize profiler (no-op when profiling is disabled).
    #[inline]
    pub fn init<P: AsRef<Path>>(_path: P) {}

    /// Shut down profiler (no-op).
    #[inline]
    pub fn shutdown() {}

    /// Set thread name (no-op).
    #[inline]
    pub fn thread_name(_name: impl Into<String>) {}

    /// Create profiling span (no-op).
    #[inline]
    pub fn span(_name: impl Into<super::SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;

    impl SpanGuard {
        /// Attach an argument to this span (builder-style; no-op).
        #[inline]
        pub fn arg(self, _key: impl Into<String>, _value: Arg) -> Self {
            self
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API surface (stable regardless of feature flag)
// ─────────────────────────────────────────────────────────────────────────────

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}
impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}
impl From<Cow<'static, str>> for SpanName {
    fn from(s: Cow<'static, str>) -> Self {
        SpanName(s)
    }
}

/// Argument value for profiling spans.
///
/// Serialized into the `args` field of Chrome Trace events and inspectable
/// in Perfetto or `chrome://tracing`.
#[derive(Debug)]
pub enum Arg {
    /// UTF-8 string value.
    Str(String),

    /// Unsigned 64-bit integer value.
    U64(u64),

    /// Signed 64-bit integer value.
    I64(i64),

    /// 64-bit floating-point value.
    F64(f64),

    /// Boolean value.
    Bool(bool),
}

// Re-export correct backend
#[cfg(feature = "profiling")]
pub use enabled::SpanGuard;

#[cfg(not(feature = "profiling"))]
pub use disabled::SpanGuard;

#[cfg(feature = "profiling")]
pub use enabled::{init, shutdown, span, thread_name};

#[cfg(not(feature = "profiling"))]
pub use disabled::{init, shutdown, span, thread_name};
