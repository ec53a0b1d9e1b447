//! Post-mortem snapshot dump (Section 6): an implementation-defined,
//! human-readable debug dump of pipeline state, taken either on request
//! (`SIGINT`/the CLI's `--debug` loop) or from the panic hook installed
//! by `gs-twin-cli`. Per Section 6 this is "not required for replay;
//! only for post-mortem inspection" — there is no binary-compat
//! requirement to honor, so this is a plain `Display` dump rather than
//! a bespoke binary layout.

use std::fmt;

use crate::pipeline::Pipeline;

/// Frame/batch/triangle/cycle counters a fatal error or a requested
/// snapshot prints, matching Section 7's "prints the frame number,
/// batch number, triangle number, per-clock cycle counters" wording.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    pub cycle: u64,
    pub frames_presented: u64,
    pub triangles_submitted: u64,
    pub command_processor_state: gpu_registers::StageState,
}

impl Snapshot {
    #[must_use]
    pub fn capture(pipeline: &Pipeline) -> Self {
        Self {
            cycle: pipeline.cycle(),
            frames_presented: pipeline.frames_presented(),
            triangles_submitted: pipeline.triangles_submitted(),
            command_processor_state: pipeline.registers().state(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "gs-twin snapshot:")?;
        writeln!(f, "  cycle               = {}", self.cycle)?;
        writeln!(f, "  frames presented    = {}", self.frames_presented)?;
        writeln!(f, "  triangles submitted = {}", self.triangles_submitted)?;
        writeln!(f, "  command processor   = {:?}", self.command_processor_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;

    #[test]
    fn capture_reflects_pipeline_counters() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let snap = Snapshot::capture(&pipeline);
        assert_eq!(snap.cycle, 0);
        assert_eq!(snap.frames_presented, 0);
        assert_eq!(snap.triangles_submitted, 0);
    }

    #[test]
    fn display_impl_prints_all_fields() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let snap = Snapshot::capture(&pipeline);
        let text = snap.to_string();
        assert!(text.contains("cycle"));
        assert!(text.contains("frames presented"));
        assert!(text.contains("triangles submitted"));
    }
}
