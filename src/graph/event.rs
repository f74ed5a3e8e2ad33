//! Structural change events and the compile phases they invalidate.

use bitflags::bitflags;

bitflags! {
    /// Set of compiler phases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompilePhase: u32 {
        const COLLECTION = 1 << 0;
        const DEPENDENCY = 1 << 1;
        const METADATA = 1 << 2;
        const SCHEDULE = 1 << 3;
        const ALLOCATION = 1 << 4;
        const DESCRIPTOR = 1 << 5;
        const COMMAND = 1 << 6;
    }
}

impl CompilePhase {
    /// `self` together with every phase that consumes the output of a phase in `self`.
    pub fn with_consumers(self) -> CompilePhase {
        let mut phases = self;
        if phases.contains(CompilePhase::COLLECTION) {
            phases |= CompilePhase::all();
        }
        if phases.contains(CompilePhase::DEPENDENCY) {
            phases |= CompilePhase::METADATA | CompilePhase::SCHEDULE;
        }
        if phases.contains(CompilePhase::METADATA) {
            phases |= CompilePhase::SCHEDULE | CompilePhase::ALLOCATION;
        }
        if phases.contains(CompilePhase::SCHEDULE) {
            phases |= CompilePhase::ALLOCATION | CompilePhase::COMMAND;
        }
        if phases.contains(CompilePhase::ALLOCATION) {
            phases |= CompilePhase::DESCRIPTOR | CompilePhase::COMMAND;
        }
        phases
    }
}

/// A structural change to the declared graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GraphEvent {
    /// A pass was added, replaced or removed.
    PassChanged,
    /// An input was added, replaced or removed.
    InputChanged,
    /// A resource was added, replaced or removed.
    ResourceChanged,
    /// A result was added or removed.
    ResultChanged,
    CanvasResized,
    ImageResized,
    BufferResized,
    RenderAreaChanged,
    LastFrameInitChanged,
    PersistenceChanged,
    MapTypeChanged,
    /// The frame boundary states of an external resource changed.
    ExternalStateChanged,
    /// The handles of an external resource changed.
    ExternalHandleChanged,
}

impl GraphEvent {
    /// The phases that must rerun after this event, not including the phases that consume their output.
    pub fn dirty(&self) -> CompilePhase {
        match self {
            GraphEvent::PassChanged | GraphEvent::InputChanged | GraphEvent::ResourceChanged => CompilePhase::COLLECTION,
            GraphEvent::ResultChanged => CompilePhase::DEPENDENCY,
            GraphEvent::CanvasResized
            | GraphEvent::ImageResized
            | GraphEvent::BufferResized
            | GraphEvent::RenderAreaChanged
            | GraphEvent::LastFrameInitChanged => CompilePhase::METADATA,
            GraphEvent::PersistenceChanged | GraphEvent::MapTypeChanged => CompilePhase::ALLOCATION,
            GraphEvent::ExternalStateChanged => CompilePhase::COMMAND,
            GraphEvent::ExternalHandleChanged => CompilePhase::DESCRIPTOR,
        }
    }
}
