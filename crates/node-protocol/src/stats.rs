//! Node load statistics (`op: "stats"`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub players: u32,
    pub playing_players: u32,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Absent when the node has no active players.
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

impl MemoryStats {
    pub fn total(&self) -> u64 {
        self.free + self.used + self.allocated + self.reservable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

/// Audio frame counters averaged over the last minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

impl NodeStats {
    /// Load score used to rank nodes; lower is better.
    ///
    /// Playing players count linearly, CPU and frame loss grow
    /// exponentially so a struggling node is avoided well before it
    /// saturates.
    pub fn penalty(&self) -> f64 {
        let cpu = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;
        let frames = self
            .frame_stats
            .as_ref()
            .map(|f| frame_penalty(f.nulled) + frame_penalty(f.deficit))
            .unwrap_or(0.0);
        f64::from(self.playing_players) + cpu + frames
    }
}

// Frame counters are per minute; 3000 frames is one full minute of audio.
// Negative counters (the node reports -1) mean "not measured".
fn frame_penalty(frames: i64) -> f64 {
    if frames < 0 {
        return 0.0;
    }
    1.03f64.powf(500.0 * (frames as f64 / 3000.0)) * 600.0 - 600.0
}
