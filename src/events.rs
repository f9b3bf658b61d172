//! Event types for TagSonic

/// Which slot pool an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Mono 3D buffers used by effect and sound tags
    Effects,
    /// Stereo buffers used by music tags
    Music,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Effects => write!(f, "effects"),
            Self::Music => write!(f, "music"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagSonicEvent {
    /// A tag began playing in a slot
    Started {
        tag: String,
        pool: PoolKind,
        slot: usize,
    },
    /// An audio instance was finalised (natural end, preemption, cascade, music exhaustion)
    Finished {
        tag: String,
    },
    /// A lower or equal priority slot was evicted for a new request
    Preempted {
        tag: String,
        by: String,
        slot: usize,
    },
    /// Too many instances of a tag overlapped and were replaced by the fallback
    Cascaded {
        tag: String,
        fallback: Option<String>,
        stopped: usize,
    },
    /// No free or preemptable slot; the request was discarded
    Dropped {
        tag: String,
        pool: PoolKind,
    },
    /// A sound shorter than its requested duration restarted from its beginning
    Looped {
        tag: String,
        slot: usize,
    },
    /// A music cross-fade began
    FadeStarted {
        from: String,
        to: String,
        span_ms: u32,
    },
    BuffersLost {
        pool: PoolKind,
    },
    BuffersRestored {
        pool: PoolKind,
    },
}

impl TagSonicEvent {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Started { tag, .. }
            | Self::Finished { tag }
            | Self::Preempted { tag, .. }
            | Self::Cascaded { tag, .. }
            | Self::Dropped { tag, .. }
            | Self::Looped { tag, .. } => Some(tag),
            Self::FadeStarted { to, .. } => Some(to),
            Self::BuffersLost { .. } | Self::BuffersRestored { .. } => None,
        }
    }

    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            Self::BuffersLost { .. } | Self::BuffersRestored { .. }
        )
    }
}
