//! Per-tick profiling counters and CSV export (§6 `--profile-csv`).
//!
//! Field selection is grounded in
//! `examples/original_source/engine/core/profile.h`'s category list
//! (`PROFILE_SIM_TICK`/`PROFILE_SIM_VOXEL_UPDATE`/`PROFILE_SIM_CONNECTIVITY`/
//! `PROFILE_SIM_PARTICLES`) cut down to the categories this crate actually
//! has a system for; the struct shape (plain public fields, a `reset`
//! method, `Default`) follows the teacher's
//! `simulation::perf::PerfStats`. CSV row format follows
//! `export_profile_csv` in `examples/original_source/app/main.cpp`
//! (`category,avg_ms,...` header, one data row per category) narrowed to one
//! row per tick since this crate profiles ticks, not rolling category
//! history.

use std::io::{self, Write};

/// Timing and counters for a single scene tick. All `_ms` fields are
/// wall-clock milliseconds the caller measured around the corresponding
/// phase; this type does no timing itself (`std::time::Instant` isn't part
/// of the simulation's deterministic core).
#[derive(Clone, Copy, Debug, Default)]
pub struct PerfStats {
    pub tick_ms: f64,
    pub physics_ms: f64,
    pub voxel_update_ms: f64,
    pub connectivity_ms: f64,
    pub particles_ms: f64,

    pub tick_count: u64,
    pub raycasts_cast: u32,
    pub islands_detached: u32,
    pub voxels_removed: u32,
    pub bodies_spawned: u32,
    pub bodies_active: u32,
    pub particles_active: u32,
    pub dirty_chunks: u32,
    pub dirty_overflow: bool,
}

impl PerfStats {
    pub fn reset(&mut self) {
        *self = PerfStats::default();
    }
}

/// Accumulates one row per tick and writes them out as CSV.
pub struct PerfLog {
    rows: Vec<PerfStats>,
}

impl PerfLog {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn record(&mut self, stats: PerfStats) {
        self.rows.push(stats);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the accumulated rows as CSV to `writer`: one header line, then
    /// one data row per recorded tick.
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(
            writer,
            "tick,tick_ms,physics_ms,voxel_update_ms,connectivity_ms,particles_ms,raycasts_cast,islands_detached,voxels_removed,bodies_spawned,bodies_active,particles_active,dirty_chunks,dirty_overflow"
        )?;
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(
                writer,
                "{},{:.3},{:.3},{:.3},{:.3},{:.3},{},{},{},{},{},{},{},{}",
                i,
                row.tick_ms,
                row.physics_ms,
                row.voxel_update_ms,
                row.connectivity_ms,
                row.particles_ms,
                row.raycasts_cast,
                row.islands_detached,
                row.voxels_removed,
                row.bodies_spawned,
                row.bodies_active,
                row.particles_active,
                row.dirty_chunks,
                row.dirty_overflow,
            )?;
        }
        Ok(())
    }

    /// Opens `path` and writes the CSV there, matching
    /// `--profile-csv <path>`'s contract.
    pub fn write_csv_to_path(&self, path: &std::path::Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

impl Default for PerfLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_defaults() {
        let mut stats = PerfStats { tick_count: 5, bodies_active: 3, ..Default::default() };
        stats.reset();
        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.bodies_active, 0);
    }

    #[test]
    fn csv_has_one_header_and_one_row_per_tick() {
        let mut log = PerfLog::new();
        log.record(PerfStats { tick_ms: 1.5, bodies_active: 2, ..Default::default() });
        log.record(PerfStats { tick_ms: 2.5, bodies_active: 3, ..Default::default() });

        let mut buf = Vec::new();
        log.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("tick,tick_ms"));
        assert!(lines[1].contains("1.500"));
        assert!(lines[2].contains("2.500"));
    }

    #[test]
    fn empty_log_writes_header_only() {
        let log = PerfLog::new();
        let mut buf = Vec::new();
        log.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
