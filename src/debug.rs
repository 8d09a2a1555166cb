use std::collections::BTreeMap;

/// Counters for one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub draw_calls: u32,
    pub shadow_passes: u32,
    pub color_passes: u32,
    pub post_passes: u32,
    /// Smoothed frames per second.
    pub fps: f32,
}

/// Debug state owned by the engine and lent to scripts each frame.
///
/// Scripts publish values with [`DebugContext::watch`]; the renderer fills in
/// [`FrameStats`]. Nothing here is global.
#[derive(Debug, Default)]
pub struct DebugContext {
    stats: FrameStats,
    last: FrameStats,
    watches: BTreeMap<String, String>,
}

impl DebugContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archives the previous frame's stats and resets the counters.
    pub fn begin_frame(&mut self, delta: f32) {
        let frame = self.stats.frame + 1;
        let instant = if delta > 0.0 { 1.0 / delta } else { 0.0 };
        let fps = if self.stats.fps == 0.0 {
            instant
        } else {
            self.stats.fps * 0.9 + instant * 0.1
        };
        self.last = self.stats;
        self.stats = FrameStats {
            frame,
            fps,
            ..FrameStats::default()
        };
    }

    /// Stats of the frame in progress.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut FrameStats {
        &mut self.stats
    }

    /// Stats of the last completed frame.
    pub fn last_frame(&self) -> &FrameStats {
        &self.last
    }

    /// Publishes a named value. Later calls overwrite earlier ones.
    pub fn watch(&mut self, name: impl Into<String>, value: impl std::fmt::Display) {
        self.watches.insert(name.into(), value.to_string());
    }

    pub fn watched(&self, name: &str) -> Option<&str> {
        self.watches.get(name).map(String::as_str)
    }

    /// Watches sorted by name.
    pub fn watches(&self) -> impl Iterator<Item = (&str, &str)> {
        self.watches.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
