//! Per-frame pass order and depth/stencil access rights.
//!
//! A frame runs exactly four passes, in this order, with no overlap and no
//! backward transition. The shared depth/stencil attachment changes hands
//! between them; [`PassKind::attachment_access`] states what each pass may
//! touch.

use crate::error::{Result, UmbraError};

/// The four passes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// Depth-writing base pass with ambient shading.
    Ambient,
    /// Compute extrusion of shadow volumes.
    VolumeGeneration,
    /// Depth-fail stencil marking of the extruded volumes.
    StencilMark,
    /// Stencil-gated lit shading.
    Lit,
}

/// Access to one aspect of the depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    None,
    ReadOnly,
    /// Cleared at the start of the pass, then written.
    ClearWrite,
}

/// Depth and stencil rights of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentAccess {
    pub depth: Access,
    pub stencil: Access,
}

impl PassKind {
    pub const ORDER: [PassKind; 4] = [
        PassKind::Ambient,
        PassKind::VolumeGeneration,
        PassKind::StencilMark,
        PassKind::Lit,
    ];

    /// Position in [`PassKind::ORDER`].
    #[must_use]
    pub fn position(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn next(self) -> Option<PassKind> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ambient => "ambient pass",
            Self::VolumeGeneration => "volume generation pass",
            Self::StencilMark => "stencil mark pass",
            Self::Lit => "lit pass",
        }
    }

    #[must_use]
    pub fn is_compute(self) -> bool {
        self == Self::VolumeGeneration
    }

    #[must_use]
    pub fn attachment_access(self) -> AttachmentAccess {
        match self {
            Self::Ambient => AttachmentAccess {
                depth: Access::ClearWrite,
                stencil: Access::None,
            },
            Self::VolumeGeneration => AttachmentAccess {
                depth: Access::None,
                stencil: Access::None,
            },
            Self::StencilMark => AttachmentAccess {
                depth: Access::ReadOnly,
                stencil: Access::ClearWrite,
            },
            Self::Lit => AttachmentAccess {
                depth: Access::ReadOnly,
                stencil: Access::ReadOnly,
            },
        }
    }
}

/// State machine that a frame's passes must walk through.
#[derive(Debug, Default, Clone)]
pub struct FrameSchedule {
    completed: Vec<PassKind>,
}

impl FrameSchedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pass allowed to begin next, `None` once the frame is complete.
    #[must_use]
    pub fn expected(&self) -> Option<PassKind> {
        PassKind::ORDER.get(self.completed.len()).copied()
    }

    /// Records the start of `pass`, failing if it is out of order.
    pub fn begin(&mut self, pass: PassKind) -> Result<()> {
        let expected = self.expected();
        if expected != Some(pass) {
            return Err(UmbraError::PassOrder {
                expected,
                found: pass,
            });
        }
        self.completed.push(pass);
        Ok(())
    }

    /// Passes begun so far, in order.
    #[must_use]
    pub fn completed(&self) -> &[PassKind] {
        &self.completed
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.len() == PassKind::ORDER.len()
    }

    /// Closes the frame. Fails unless all four passes have begun.
    pub fn finish(self) -> Result<Vec<PassKind>> {
        if !self.is_complete() {
            return Err(UmbraError::IncompleteFrame {
                completed: self.completed.len(),
            });
        }
        Ok(self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_frame_in_order() {
        let mut schedule = FrameSchedule::new();
        for pass in PassKind::ORDER {
            schedule.begin(pass).unwrap();
        }
        assert_eq!(schedule.finish().unwrap(), PassKind::ORDER.to_vec());
    }

    #[test]
    fn test_stencil_before_ambient_rejected() {
        let mut schedule = FrameSchedule::new();
        let err = schedule.begin(PassKind::StencilMark).unwrap_err();
        assert!(matches!(
            err,
            UmbraError::PassOrder {
                expected: Some(PassKind::Ambient),
                found: PassKind::StencilMark
            }
        ));
    }

    #[test]
    fn test_lit_requires_stencil_mark() {
        let mut schedule = FrameSchedule::new();
        schedule.begin(PassKind::Ambient).unwrap();
        schedule.begin(PassKind::VolumeGeneration).unwrap();
        assert!(schedule.begin(PassKind::Lit).is_err());
        schedule.begin(PassKind::StencilMark).unwrap();
        schedule.begin(PassKind::Lit).unwrap();
        // no fifth pass
        assert!(schedule.begin(PassKind::Lit).is_err());
    }

    #[test]
    fn test_incomplete_frame() {
        let mut schedule = FrameSchedule::new();
        schedule.begin(PassKind::Ambient).unwrap();
        let err = schedule.finish().unwrap_err();
        assert!(matches!(err, UmbraError::IncompleteFrame { completed: 1 }));
    }

    #[test]
    fn test_attachment_rights_rotate() {
        let rights: Vec<_> = PassKind::ORDER
            .iter()
            .map(|p| {
                let a = p.attachment_access();
                (a.depth, a.stencil)
            })
            .collect();
        assert_eq!(
            rights,
            vec![
                (Access::ClearWrite, Access::None),
                (Access::None, Access::None),
                (Access::ReadOnly, Access::ClearWrite),
                (Access::ReadOnly, Access::ReadOnly)
            ]
        );
    }

    #[test]
    fn test_next() {
        assert_eq!(PassKind::Ambient.next(), Some(PassKind::VolumeGeneration));
        assert_eq!(PassKind::Lit.next(), None);
    }
}
