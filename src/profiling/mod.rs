/// Chrome Trace (flame-style) execution profiler.
///
/// Feature-gated, zero-overhead when disabled. When the `profiling` feature
/// is enabled, rebuild phases record structured spans and emit a Chrome
/// Trace Event JSON file inspectable in:
///
/// - `chrome://tracing`
/// - <https://ui.perfetto.dev>
///
/// When the feature is disabled, every call compiles to a no-op (no
/// allocations, no atomics, no branches).
///
/// ## Usage
///
/// ```no_run
/// use particle_store::profiling as profiler;
///
/// profiler::init("profile/trace.json");
///
/// {
///     let _g = profiler::span("rebuild/packed");
///     // migrate and rebuild
/// }
///
/// profiler::shutdown();
/// ```
pub mod profiler;

pub use profiler::{init, shutdown, span, thread_name, Arg, SpanGuard, SpanName};
