//! The persistent automaton handle.
//!
//! An automaton owns exactly two files: a header (metadata, event set,
//! special-transition lists) and a body (fixed-width state records addressed
//! by ID). The header is rewritten on every metadata change; body layout
//! changes (capacity growth, renumbering) go through a unique temporary file
//! that is atomically persisted over the original.
//!
//! Validation failures are sentinel returns; only I/O failures and corrupt
//! files produce errors.

use crate::body::{BodyLayout, State};
use crate::flags::StateFlags;
use crate::header::{decode_header, encode_header, HeaderMeta, SpecialTables};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use syndes_core::{
    bytes_per_event_id, bytes_per_state_id, round_up_capacity, AutomatonKind, CommunicationData,
    DisablementData, Event, EventId, EventSet, NashCommunicationData, SpecialTable, StateId,
    StoreError, SyndesResult, Transition, TransitionData, MAX_CONTROLLERS, MAX_LABEL_LENGTH,
    MAX_TRANSITION_CAPACITY,
};
use tempfile::NamedTempFile;
use tracing::debug;

/// Capacities requested at creation time. Capacities only ever grow from
/// here; the state capacity is normalized up to the next `256^k - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub state_capacity: u64,
    pub transition_capacity: u32,
    pub label_length: u32,
    pub n_controllers: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_capacity: 255,
            transition_capacity: 4,
            label_length: 16,
            n_controllers: 1,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), StoreError> {
        if self.n_controllers == 0 || self.n_controllers > MAX_CONTROLLERS {
            return Err(StoreError::invalid_config(format!(
                "controller count {} outside 1..={MAX_CONTROLLERS}",
                self.n_controllers
            )));
        }
        if self.label_length == 0 || self.label_length > MAX_LABEL_LENGTH {
            return Err(StoreError::invalid_config(format!(
                "label length {} outside 1..={MAX_LABEL_LENGTH}",
                self.label_length
            )));
        }
        if self.transition_capacity == 0 || self.transition_capacity > MAX_TRANSITION_CAPACITY {
            return Err(StoreError::invalid_config(format!(
                "transition capacity {} outside 1..={MAX_TRANSITION_CAPACITY}",
                self.transition_capacity
            )));
        }
        if self.state_capacity == 0 {
            return Err(StoreError::invalid_config("state capacity 0".to_owned()));
        }
        Ok(())
    }
}

/// A disk-backed automaton.
#[derive(Debug)]
pub struct Automaton {
    kind: AutomatonKind,
    header_path: PathBuf,
    body_path: PathBuf,
    header_file: File,
    body_file: File,
    n_states: u64,
    event_capacity: u32,
    state_capacity: u64,
    transition_capacity: u32,
    label_length: u32,
    initial_state: StateId,
    n_controllers: u32,
    events: EventSet,
    special: SpecialTables,
}

impl Automaton {
    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a fresh automaton, truncating any existing files at the given
    /// paths.
    pub fn create(
        kind: AutomatonKind,
        header_path: impl Into<PathBuf>,
        body_path: impl Into<PathBuf>,
        config: &StoreConfig,
    ) -> SyndesResult<Automaton> {
        let header_path = header_path.into();
        let body_path = body_path.into();
        config.validate()?;

        let header_file = open_rw(&header_path, true)?;
        let body_file = open_rw(&body_path, true)?;

        let mut automaton = Automaton {
            kind,
            header_path,
            body_path,
            header_file,
            body_file,
            n_states: 0,
            event_capacity: 255,
            state_capacity: round_up_capacity(config.state_capacity),
            transition_capacity: config.transition_capacity,
            label_length: config.label_length,
            initial_state: StateId::NULL,
            n_controllers: config.n_controllers,
            events: EventSet::new(),
            special: SpecialTables::default(),
        };
        automaton.write_header()?;
        Ok(automaton)
    }

    /// Open an existing automaton, validating the header against the body.
    pub fn open(
        header_path: impl Into<PathBuf>,
        body_path: impl Into<PathBuf>,
    ) -> SyndesResult<Automaton> {
        let header_path = header_path.into();
        let body_path = body_path.into();

        let header_file = open_rw(&header_path, false)?;
        let body_file = open_rw(&body_path, false)?;

        let mut bytes = Vec::new();
        let mut reader: &File = &header_file;
        reader
            .seek(SeekFrom::Start(0))
            .and_then(|_| reader.read_to_end(&mut bytes))
            .map_err(|e| StoreError::io(&header_path, e))?;
        let (meta, events, special) = decode_header(&bytes, &header_path)?;

        let automaton = Automaton {
            kind: meta.kind,
            header_path,
            body_path,
            header_file,
            body_file,
            n_states: meta.n_states,
            event_capacity: meta.event_capacity,
            state_capacity: meta.state_capacity,
            transition_capacity: meta.transition_capacity,
            label_length: meta.label_length,
            initial_state: meta.initial_state,
            n_controllers: meta.n_controllers,
            events,
            special,
        };

        let body_len = automaton.body_len()?;
        let record = automaton.layout().record_size();
        if automaton.n_states > 0
            && body_len < automaton.n_states.saturating_add(1).saturating_mul(record)
        {
            return Err(StoreError::corrupt_body(
                &automaton.body_path,
                format!(
                    "body holds {body_len} bytes, too short for the {} states the header promises",
                    automaton.n_states
                ),
            )
            .into());
        }
        Ok(automaton)
    }

    /// Byte-copy this automaton to fresh files, optionally switching the kind
    /// tag (tables the new kind lacks are dropped).
    pub fn duplicate_to(
        &self,
        kind: AutomatonKind,
        header_path: impl Into<PathBuf>,
        body_path: impl Into<PathBuf>,
    ) -> SyndesResult<Automaton> {
        let header_path = header_path.into();
        let body_path = body_path.into();
        std::fs::copy(&self.body_path, &body_path).map_err(|e| StoreError::io(&body_path, e))?;

        let header_file = open_rw(&header_path, true)?;
        let body_file = open_rw(&body_path, false)?;

        let mut special = self.special.clone();
        if !kind.has_table(SpecialTable::NashCommunications) {
            special = SpecialTables {
                bad_transitions: special.bad_transitions,
                ..Default::default()
            };
        }

        let mut duplicate = Automaton {
            kind,
            header_path,
            body_path,
            header_file,
            body_file,
            n_states: self.n_states,
            event_capacity: self.event_capacity,
            state_capacity: self.state_capacity,
            transition_capacity: self.transition_capacity,
            label_length: self.label_length,
            initial_state: self.initial_state,
            n_controllers: self.n_controllers,
            events: self.events.clone(),
            special,
        };
        duplicate.write_header()?;
        Ok(duplicate)
    }

    /// Flush and release both files.
    pub fn close(self) -> SyndesResult<()> {
        self.header_file
            .sync_all()
            .map_err(|e| StoreError::io(&self.header_path, e))?;
        self.body_file
            .sync_all()
            .map_err(|e| StoreError::io(&self.body_path, e))?;
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn kind(&self) -> AutomatonKind {
        self.kind
    }

    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    pub fn body_path(&self) -> &Path {
        &self.body_path
    }

    pub fn number_of_states(&self) -> u64 {
        self.n_states
    }

    pub fn state_capacity(&self) -> u64 {
        self.state_capacity
    }

    pub fn transition_capacity(&self) -> u32 {
        self.transition_capacity
    }

    pub fn label_length(&self) -> u32 {
        self.label_length
    }

    pub fn initial_state(&self) -> StateId {
        self.initial_state
    }

    pub fn number_of_controllers(&self) -> u32 {
        self.n_controllers
    }

    pub fn events(&self) -> &EventSet {
        &self.events
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn special(&self) -> &SpecialTables {
        &self.special
    }

    pub fn bad_transitions(&self) -> &[TransitionData] {
        &self.special.bad_transitions
    }

    pub fn unconditional_violations(&self) -> &[TransitionData] {
        &self.special.unconditional_violations
    }

    pub fn conditional_violations(&self) -> &[TransitionData] {
        &self.special.conditional_violations
    }

    pub fn potential_communications(&self) -> &[CommunicationData] {
        &self.special.potential_communications
    }

    pub fn invalid_communications(&self) -> &[TransitionData] {
        &self.special.invalid_communications
    }

    pub fn nash_communications(&self) -> &[NashCommunicationData] {
        &self.special.nash_communications
    }

    pub fn disablement_decisions(&self) -> &[DisablementData] {
        &self.special.disablement_decisions
    }

    pub fn suppressed_transitions(&self) -> &[TransitionData] {
        &self.special.suppressed_transitions
    }

    /// `1 + labelLength + transitionCapacity * (nBytesPerEventId + nBytesPerStateId)`.
    pub fn bytes_per_state(&self) -> u64 {
        self.layout().record_size()
    }

    fn layout(&self) -> BodyLayout {
        BodyLayout {
            label_length: self.label_length,
            transition_capacity: self.transition_capacity,
            n_bytes_per_event_id: bytes_per_event_id(self.event_capacity),
            n_bytes_per_state_id: bytes_per_state_id(self.state_capacity),
        }
    }

    fn meta(&self) -> HeaderMeta {
        HeaderMeta {
            kind: self.kind,
            n_states: self.n_states,
            event_capacity: self.event_capacity,
            state_capacity: self.state_capacity,
            transition_capacity: self.transition_capacity,
            label_length: self.label_length,
            initial_state: self.initial_state,
            n_controllers: self.n_controllers,
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Light read of the flag byte alone.
    pub fn state_exists(&self, id: StateId) -> SyndesResult<bool> {
        if id.is_null() || id.get() > self.state_capacity {
            return Ok(false);
        }
        let mut flag = [0u8; 1];
        if !self.read_at(self.layout().offset_of(id), &mut flag)? {
            return Ok(false);
        }
        Ok(StateFlags::from_bits_truncate(flag[0]).contains(StateFlags::EXISTS))
    }

    /// Read a full state record, transitions included.
    pub fn get_state(&self, id: StateId) -> SyndesResult<Option<State>> {
        let layout = self.layout();
        match self.read_record(&layout, id)? {
            Some(buf) => Ok(layout.decode_record(id, &buf)),
            None => Ok(None),
        }
    }

    /// Read a state's flags and label without its transitions.
    pub fn get_state_shallow(&self, id: StateId) -> SyndesResult<Option<State>> {
        if id.is_null() || id.get() > self.state_capacity {
            return Ok(None);
        }
        let layout = self.layout();
        let mut buf = vec![0u8; layout.record_size() as usize];
        let prefix = 1 + layout.label_length as usize;
        if !self.read_at(layout.offset_of(id), &mut buf[..prefix])? {
            return Ok(None);
        }
        Ok(layout.decode_record(id, &buf).map(|mut state| {
            state.transitions.clear();
            state
        }))
    }

    /// Sequentially iterate every existing state in ascending ID order.
    ///
    /// The scan keeps its own file position, so point reads on the same
    /// automaton may be interleaved with it.
    pub fn scan_states(&self) -> SyndesResult<StateScan<'_>> {
        let layout = self.layout();
        let last_id = self.last_addressable_id()?;
        Ok(StateScan {
            file: &self.body_file,
            body_path: &self.body_path,
            buf: vec![0u8; layout.record_size() as usize],
            layout,
            next_id: 1,
            last_id,
        })
    }

    // ========================================================================
    // MUTATORS
    // ========================================================================

    /// Add an event. Returns the null ID when the label is a duplicate or the
    /// flag vectors are not sized to the controller count.
    pub fn add_event(
        &mut self,
        label: &str,
        observable: &[bool],
        controllable: &[bool],
    ) -> SyndesResult<EventId> {
        if observable.len() != self.n_controllers as usize
            || controllable.len() != self.n_controllers as usize
        {
            return Ok(EventId::NULL);
        }
        if self.events.contains_label(label) {
            return Ok(EventId::NULL);
        }
        if !self.ensure_event_capacity(self.events.len() as u32 + 1)? {
            return Ok(EventId::NULL);
        }
        let id = self.events.insert(
            label,
            observable.iter().copied().collect(),
            controllable.iter().copied().collect(),
        );
        self.write_header()?;
        Ok(id)
    }

    /// Append a state at ID `nStates + 1`. Returns the null ID when the
    /// label or the new ID exceeds its cap.
    pub fn add_state(
        &mut self,
        label: &str,
        marked: bool,
        is_initial: bool,
    ) -> SyndesResult<StateId> {
        if label.len() as u64 > MAX_LABEL_LENGTH as u64 {
            return Ok(StateId::NULL);
        }
        let Some(raw_id) = self.n_states.checked_add(1) else {
            return Ok(StateId::NULL);
        };
        let id = StateId::new(raw_id);
        if !self.ensure_label_length(label.len() as u32)? {
            return Ok(StateId::NULL);
        }
        if !self.ensure_state_capacity(raw_id)? {
            return Ok(StateId::NULL);
        }
        self.write_record(&State {
            id,
            label: label.to_owned(),
            marked,
            enablement: false,
            disablement: false,
            transitions: Vec::new(),
        })?;
        self.n_states = raw_id;
        if is_initial {
            self.initial_state = id;
        }
        self.write_header()?;
        Ok(id)
    }

    /// Place a state record at an explicit ID, growing capacities to fit.
    /// Returns false without writing when the slot is already occupied or a
    /// cap is exceeded.
    pub fn add_state_at(
        &mut self,
        label: &str,
        marked: bool,
        transitions: &[Transition],
        is_initial: bool,
        id: StateId,
    ) -> SyndesResult<bool> {
        if id.is_null()
            || label.len() as u64 > MAX_LABEL_LENGTH as u64
            || transitions.len() as u64 > MAX_TRANSITION_CAPACITY as u64
        {
            return Ok(false);
        }
        if self.state_exists(id)? {
            return Ok(false);
        }
        // The record must be able to encode its own ID and every transition
        // target at the grown width.
        let widest_id = transitions
            .iter()
            .map(|t| t.target.get())
            .chain([id.get()])
            .max()
            .unwrap_or(id.get());
        if !self.ensure_label_length(label.len() as u32)?
            || !self.ensure_state_capacity(widest_id)?
            || !self.ensure_transition_capacity(transitions.len() as u32)?
        {
            return Ok(false);
        }
        self.write_record(&State {
            id,
            label: label.to_owned(),
            marked,
            enablement: false,
            disablement: false,
            transitions: transitions.to_vec(),
        })?;
        self.n_states += 1;
        if is_initial {
            self.initial_state = id;
        }
        self.write_header()?;
        Ok(true)
    }

    /// Append a transition to a state's list, growing the transition
    /// capacity if needed. Returns false when the starting state does not
    /// exist or the event is unknown.
    pub fn add_transition(
        &mut self,
        start: StateId,
        event: EventId,
        target: StateId,
    ) -> SyndesResult<bool> {
        if self.events.get(event).is_none() || target.is_null() {
            return Ok(false);
        }
        let Some(mut state) = self.get_state(start)? else {
            return Ok(false);
        };
        let count = state.transitions.len() as u32 + 1;
        if !self.ensure_transition_capacity(count)? {
            return Ok(false);
        }
        state.transitions.push(Transition::new(event, target));
        self.write_record(&state)?;
        Ok(true)
    }

    /// Remove one matching transition. Returns false when absent.
    pub fn remove_transition(
        &mut self,
        start: StateId,
        event: EventId,
        target: StateId,
    ) -> SyndesResult<bool> {
        let Some(mut state) = self.get_state(start)? else {
            return Ok(false);
        };
        let Some(position) = state
            .transitions
            .iter()
            .position(|t| t.event == event && t.target == target)
        else {
            return Ok(false);
        };
        state.transitions.remove(position);
        self.write_record(&state)?;
        Ok(true)
    }

    /// Set the U-Structure enablement/disablement annotation bits on a state.
    pub fn annotate_state(
        &mut self,
        id: StateId,
        enablement: bool,
        disablement: bool,
    ) -> SyndesResult<bool> {
        if !self.kind.is_ustructure() {
            return Ok(false);
        }
        let Some(mut state) = self.get_state(id)? else {
            return Ok(false);
        };
        state.enablement = enablement;
        state.disablement = disablement;
        self.write_record(&state)?;
        Ok(true)
    }

    /// Point the initial-state marker at `id` (or the null ID for
    /// "unspecified").
    pub fn set_initial_state(&mut self, id: StateId) -> SyndesResult<bool> {
        if id.get() > self.state_capacity {
            return Ok(false);
        }
        self.initial_state = id;
        self.write_header()?;
        Ok(true)
    }

    // ========================================================================
    // SPECIAL-TRANSITION MUTATORS
    // ========================================================================

    /// Tag an existing transition as bad. Returns false when the transition
    /// is not present.
    pub fn mark_transition_as_bad(
        &mut self,
        initial: StateId,
        event: EventId,
        target: StateId,
    ) -> SyndesResult<bool> {
        let Some(state) = self.get_state(initial)? else {
            return Ok(false);
        };
        if !state.has_transition(event, target) {
            return Ok(false);
        }
        self.special
            .bad_transitions
            .push(TransitionData::new(initial, event, target));
        self.write_header()?;
        Ok(true)
    }

    pub fn add_unconditional_violation(&mut self, data: TransitionData) -> SyndesResult<bool> {
        self.push_transition_table(SpecialTable::UnconditionalViolations, data)
    }

    pub fn add_conditional_violation(&mut self, data: TransitionData) -> SyndesResult<bool> {
        self.push_transition_table(SpecialTable::ConditionalViolations, data)
    }

    pub fn add_invalid_communication(&mut self, data: TransitionData) -> SyndesResult<bool> {
        self.push_transition_table(SpecialTable::InvalidCommunications, data)
    }

    pub fn add_suppressed_transition(&mut self, data: TransitionData) -> SyndesResult<bool> {
        self.push_transition_table(SpecialTable::SuppressedTransitions, data)
    }

    fn push_transition_table(
        &mut self,
        table: SpecialTable,
        data: TransitionData,
    ) -> SyndesResult<bool> {
        if !self.kind.has_table(table) {
            return Ok(false);
        }
        let list = match table {
            SpecialTable::UnconditionalViolations => &mut self.special.unconditional_violations,
            SpecialTable::ConditionalViolations => &mut self.special.conditional_violations,
            SpecialTable::InvalidCommunications => &mut self.special.invalid_communications,
            SpecialTable::SuppressedTransitions => &mut self.special.suppressed_transitions,
            _ => &mut self.special.bad_transitions,
        };
        list.push(data);
        self.write_header()?;
        Ok(true)
    }

    /// Record a potential communication. The roles vector must be sized to
    /// the controller count.
    pub fn add_potential_communication(&mut self, comm: CommunicationData) -> SyndesResult<bool> {
        if !self.kind.has_table(SpecialTable::PotentialCommunications)
            || comm.roles.len() != self.n_controllers as usize
        {
            return Ok(false);
        }
        self.special.potential_communications.push(comm);
        self.write_header()?;
        Ok(true)
    }

    pub fn add_nash_communication(&mut self, nash: NashCommunicationData) -> SyndesResult<bool> {
        if !self.kind.has_table(SpecialTable::NashCommunications)
            || nash.roles.len() != self.n_controllers as usize
        {
            return Ok(false);
        }
        self.special.nash_communications.push(nash);
        self.write_header()?;
        Ok(true)
    }

    pub fn add_disablement_decision(&mut self, decision: DisablementData) -> SyndesResult<bool> {
        if !self.kind.has_table(SpecialTable::DisablementDecisions)
            || decision.controllers.len() != self.n_controllers as usize
        {
            return Ok(false);
        }
        self.special.disablement_decisions.push(decision);
        self.write_header()?;
        Ok(true)
    }

    /// Replace the special-transition tables wholesale, dropping lists the
    /// kind does not carry. Used by operations that carry annotations over
    /// onto a derived automaton.
    pub fn import_special(&mut self, mut tables: SpecialTables) -> SyndesResult<()> {
        if !self.kind.has_table(SpecialTable::NashCommunications) {
            tables = SpecialTables {
                bad_transitions: tables.bad_transitions,
                ..Default::default()
            };
        }
        self.special = tables;
        self.write_header()
    }

    // ========================================================================
    // IN-PLACE REWRITERS
    // ========================================================================

    /// Compact state IDs to a dense `1..=nStates` range.
    ///
    /// States are processed in ascending old-ID order, so the mapping is
    /// monotone and relative order is preserved. Every transition, the
    /// initial-state pointer, and all special-transition lists are rewritten
    /// through a scratch mapping file.
    pub fn renumber_states(&mut self) -> SyndesResult<()> {
        let layout = self.layout();
        let record = layout.record_size();
        let last_id = self.last_addressable_id()?;

        // Pass 1: assign dense IDs in ascending order into the scratch file.
        let scratch =
            tempfile::tempfile().map_err(|e| StoreError::io(&self.body_path, e))?;
        let mut assigned: u64 = 0;
        {
            let mut reader = BufReader::new(&self.body_file);
            reader
                .seek(SeekFrom::Start(record))
                .map_err(|e| StoreError::io(&self.body_path, e))?;
            let mut buf = vec![0u8; record as usize];
            for id in 1..=last_id {
                reader
                    .read_exact(&mut buf)
                    .map_err(|e| StoreError::io(&self.body_path, e))?;
                if StateFlags::from_bits_truncate(buf[0]).contains(StateFlags::EXISTS) {
                    assigned += 1;
                    write_mapping(&scratch, &self.body_path, StateId::new(id), assigned)?;
                }
            }
        }
        if assigned != self.n_states {
            return Err(syndes_core::OperationError::RenumberInvariant {
                details: format!(
                    "{assigned} records found, header promises {}",
                    self.n_states
                ),
            }
            .into());
        }
        debug!(states = assigned, last_id, "renumbering state records");

        // Pass 2: rewrite the body densely, remapping transition targets.
        let tmp = NamedTempFile::new_in(parent_dir(&self.body_path))
            .map_err(|e| StoreError::io(&self.body_path, e))?;
        {
            let mut reader = BufReader::new(&self.body_file);
            reader
                .seek(SeekFrom::Start(record))
                .map_err(|e| StoreError::io(&self.body_path, e))?;
            let mut writer = BufWriter::new(tmp.as_file());
            let padding = vec![0u8; record as usize];
            writer
                .write_all(&padding)
                .map_err(|e| StoreError::io(&self.body_path, e))?;

            let mut buf = vec![0u8; record as usize];
            let mut next_id: u64 = 0;
            for id in 1..=last_id {
                reader
                    .read_exact(&mut buf)
                    .map_err(|e| StoreError::io(&self.body_path, e))?;
                let Some(mut state) = layout.decode_record(StateId::new(id), &buf) else {
                    continue;
                };
                next_id += 1;
                state.id = StateId::new(next_id);
                let mut remapped = Vec::with_capacity(state.transitions.len());
                for transition in state.transitions {
                    if let Some(target) =
                        read_mapping(&scratch, &self.body_path, transition.target)?
                    {
                        remapped.push(Transition::new(transition.event, target));
                    }
                }
                state.transitions = remapped;
                layout.encode_record(&state, &mut buf);
                writer
                    .write_all(&buf)
                    .map_err(|e| StoreError::io(&self.body_path, e))?;
            }
            writer
                .flush()
                .map_err(|e| StoreError::io(&self.body_path, e))?;
        }
        self.body_file = tmp
            .persist(&self.body_path)
            .map_err(|e| StoreError::io(&self.body_path, e.error))?;

        // Remap the header-level state references.
        self.initial_state = read_mapping(&scratch, &self.body_path, self.initial_state)?
            .unwrap_or(StateId::NULL);
        let scratch_ref = &scratch;
        let body_path = self.body_path.clone();
        let mut remap_error = None;
        self.special.remap_states(|id| {
            match read_mapping(scratch_ref, &body_path, id) {
                Ok(mapped) => mapped,
                Err(e) => {
                    remap_error.get_or_insert(e);
                    None
                }
            }
        });
        if let Some(e) = remap_error {
            return Err(e);
        }
        self.write_header()
    }

    /// Remove events that no longer label any transition and compact the
    /// survivors' IDs to `1..=m`.
    pub fn remove_inactive_events(&mut self) -> SyndesResult<()> {
        let mut active: FxHashSet<EventId> = FxHashSet::default();
        for state in self.scan_states()? {
            let state = state?;
            active.extend(state.transitions.iter().map(|t| t.event));
        }
        if active.len() == self.events.len() {
            return Ok(());
        }
        debug!(
            active = active.len(),
            total = self.events.len(),
            "removing inactive events"
        );
        let mapping = self.events.retain_remap(|event| active.contains(&event.id()));

        // Same layout, new event IDs: rewrite every record through a
        // temporary body.
        let layout = self.layout();
        self.rewrite_records(layout, layout, |state| {
            state.transitions = state
                .transitions
                .iter()
                .filter_map(|t| {
                    mapping
                        .get(&t.event)
                        .map(|&event| Transition::new(event, t.target))
                })
                .collect();
        })?;
        self.special.remap_events(|id| mapping.get(&id).copied());
        self.write_header()
    }

    // ========================================================================
    // JSON FORM
    // ========================================================================

    /// The self-describing JSON rendition of the automaton. The binary
    /// header/body pair remains the canonical format.
    pub fn dump_json(&self) -> SyndesResult<serde_json::Value> {
        let mut states = Vec::new();
        for state in self.scan_states()? {
            states.push(state?);
        }
        let events: Vec<serde_json::Value> = self
            .events
            .iter()
            .map(|e| {
                json!({
                    "id": e.id().get(),
                    "label": e.label(),
                    "observable": e.observable(),
                    "controllable": e.controllable(),
                })
            })
            .collect();
        Ok(json!({
            "type": self.kind,
            "nStates": self.n_states,
            "stateCapacity": self.state_capacity,
            "transitionCapacity": self.transition_capacity,
            "labelLength": self.label_length,
            "initialState": self.initial_state.get(),
            "nControllers": self.n_controllers,
            "events": events,
            "states": states,
            "specialTransitions": {
                "badTransitions": self.special.bad_transitions,
                "unconditionalViolations": self.special.unconditional_violations,
                "conditionalViolations": self.special.conditional_violations,
                "potentialCommunications": self.special.potential_communications,
                "invalidCommunications": self.special.invalid_communications,
                "nashCommunications": self.special.nash_communications,
                "disablementDecisions": self.special.disablement_decisions,
                "suppressedTransitions": self.special.suppressed_transitions,
            },
        }))
    }

    /// Rebuild an automaton from its [`dump_json`](Automaton::dump_json)
    /// rendition into fresh store files.
    pub fn load_json(
        value: &serde_json::Value,
        header_path: impl Into<PathBuf>,
        body_path: impl Into<PathBuf>,
    ) -> SyndesResult<Automaton> {
        fn field<'v>(value: &'v serde_json::Value, name: &str) -> SyndesResult<&'v serde_json::Value> {
            let field = &value[name];
            if field.is_null() {
                return Err(StoreError::malformed_json(format!("missing field {name}")).into());
            }
            Ok(field)
        }
        fn uint(value: &serde_json::Value, name: &str) -> SyndesResult<u64> {
            field(value, name)?.as_u64().ok_or_else(|| {
                StoreError::malformed_json(format!("field {name} is not an unsigned integer"))
                    .into()
            })
        }
        fn parse<T: serde::de::DeserializeOwned>(
            value: &serde_json::Value,
            name: &str,
        ) -> SyndesResult<T> {
            serde_json::from_value(field(value, name)?.clone())
                .map_err(|e| StoreError::malformed_json(format!("field {name}: {e}")).into())
        }

        let kind: AutomatonKind = parse(value, "type")?;
        let config = StoreConfig {
            state_capacity: uint(value, "stateCapacity")?,
            transition_capacity: uint(value, "transitionCapacity")? as u32,
            label_length: uint(value, "labelLength")? as u32,
            n_controllers: uint(value, "nControllers")? as u32,
        };
        let mut automaton = Automaton::create(kind, header_path, body_path, &config)?;

        for event in field(value, "events")?
            .as_array()
            .ok_or_else(|| StoreError::malformed_json("events is not an array"))?
        {
            let label = field(event, "label")?
                .as_str()
                .ok_or_else(|| StoreError::malformed_json("event label is not a string"))?;
            let observable: Vec<bool> = parse(event, "observable")?;
            let controllable: Vec<bool> = parse(event, "controllable")?;
            if automaton
                .add_event(label, &observable, &controllable)?
                .is_null()
            {
                return Err(StoreError::malformed_json(format!(
                    "event {label:?} is a duplicate or wrongly sized"
                ))
                .into());
            }
        }

        for state in field(value, "states")?
            .as_array()
            .ok_or_else(|| StoreError::malformed_json("states is not an array"))?
        {
            let state: State = serde_json::from_value(state.clone())
                .map_err(|e| StoreError::malformed_json(format!("state record: {e}")))?;
            if !automaton.add_state_at(
                &state.label,
                state.marked,
                &state.transitions,
                false,
                state.id,
            )? {
                return Err(StoreError::malformed_json(format!(
                    "state {} is a duplicate or over capacity",
                    state.id
                ))
                .into());
            }
            if state.enablement || state.disablement {
                automaton.annotate_state(state.id, state.enablement, state.disablement)?;
            }
        }
        automaton.set_initial_state(StateId::new(uint(value, "initialState")?))?;

        let special = field(value, "specialTransitions")?;
        automaton.import_special(SpecialTables {
            bad_transitions: parse(special, "badTransitions")?,
            unconditional_violations: parse(special, "unconditionalViolations")?,
            conditional_violations: parse(special, "conditionalViolations")?,
            potential_communications: parse(special, "potentialCommunications")?,
            invalid_communications: parse(special, "invalidCommunications")?,
            nash_communications: parse(special, "nashCommunications")?,
            disablement_decisions: parse(special, "disablementDecisions")?,
            suppressed_transitions: parse(special, "suppressedTransitions")?,
        })?;
        Ok(automaton)
    }

    // ========================================================================
    // CAPACITY GROWTH
    // ========================================================================

    fn ensure_label_length(&mut self, len: u32) -> SyndesResult<bool> {
        if len <= self.label_length {
            return Ok(true);
        }
        if len > MAX_LABEL_LENGTH {
            return Ok(false);
        }
        let old = self.layout();
        let new = BodyLayout {
            label_length: len,
            ..old
        };
        debug!(from = self.label_length, to = len, "growing label length");
        self.rewrite_records(old, new, |_| {})?;
        self.label_length = len;
        self.write_header()?;
        Ok(true)
    }

    fn ensure_transition_capacity(&mut self, count: u32) -> SyndesResult<bool> {
        if count <= self.transition_capacity {
            return Ok(true);
        }
        if count > MAX_TRANSITION_CAPACITY {
            return Ok(false);
        }
        let old = self.layout();
        let new = BodyLayout {
            transition_capacity: count,
            ..old
        };
        debug!(
            from = self.transition_capacity,
            to = count,
            "growing transition capacity"
        );
        self.rewrite_records(old, new, |_| {})?;
        self.transition_capacity = count;
        self.write_header()?;
        Ok(true)
    }

    fn ensure_state_capacity(&mut self, id: u64) -> SyndesResult<bool> {
        if id <= self.state_capacity {
            return Ok(true);
        }
        let capacity = round_up_capacity(id);
        let old = self.layout();
        let new = BodyLayout {
            n_bytes_per_state_id: bytes_per_state_id(capacity),
            ..old
        };
        debug!(
            from = self.state_capacity,
            to = capacity,
            "growing state capacity"
        );
        self.rewrite_records(old, new, |_| {})?;
        self.state_capacity = capacity;
        self.write_header()?;
        Ok(true)
    }

    fn ensure_event_capacity(&mut self, count: u32) -> SyndesResult<bool> {
        if count <= self.event_capacity {
            return Ok(true);
        }
        let capacity = round_up_capacity(count as u64) as u32;
        let old = self.layout();
        let new = BodyLayout {
            n_bytes_per_event_id: bytes_per_event_id(capacity),
            ..old
        };
        debug!(
            from = self.event_capacity,
            to = capacity,
            "growing event capacity"
        );
        self.rewrite_records(old, new, |_| {})?;
        self.event_capacity = capacity;
        self.write_header()?;
        Ok(true)
    }

    /// Rewrite every record from `old` layout to `new` layout through a
    /// temporary file, applying `patch` to each decoded state, then swap the
    /// temporary over the body.
    fn rewrite_records<F>(&mut self, old: BodyLayout, new: BodyLayout, mut patch: F) -> SyndesResult<()>
    where
        F: FnMut(&mut State),
    {
        let last_id = self.last_addressable_id()?;
        let tmp = NamedTempFile::new_in(parent_dir(&self.body_path))
            .map_err(|e| StoreError::io(&self.body_path, e))?;
        {
            let mut reader = BufReader::new(&self.body_file);
            reader
                .seek(SeekFrom::Start(old.record_size()))
                .map_err(|e| StoreError::io(&self.body_path, e))?;
            let mut writer = BufWriter::new(tmp.as_file());
            let mut old_buf = vec![0u8; old.record_size() as usize];
            let mut new_buf = vec![0u8; new.record_size() as usize];
            let padding = vec![0u8; new.record_size() as usize];
            writer
                .write_all(&padding)
                .map_err(|e| StoreError::io(&self.body_path, e))?;
            for id in 1..=last_id {
                reader
                    .read_exact(&mut old_buf)
                    .map_err(|e| StoreError::io(&self.body_path, e))?;
                match old.decode_record(StateId::new(id), &old_buf) {
                    Some(mut state) => {
                        patch(&mut state);
                        new.encode_record(&state, &mut new_buf);
                        writer
                            .write_all(&new_buf)
                            .map_err(|e| StoreError::io(&self.body_path, e))?;
                    }
                    None => {
                        writer
                            .write_all(&padding)
                            .map_err(|e| StoreError::io(&self.body_path, e))?;
                    }
                }
            }
            writer
                .flush()
                .map_err(|e| StoreError::io(&self.body_path, e))?;
        }
        self.body_file = tmp
            .persist(&self.body_path)
            .map_err(|e| StoreError::io(&self.body_path, e.error))?;
        Ok(())
    }

    // ========================================================================
    // RAW FILE ACCESS
    // ========================================================================

    fn body_len(&self) -> SyndesResult<u64> {
        Ok(self
            .body_file
            .metadata()
            .map_err(|e| StoreError::io(&self.body_path, e))?
            .len())
    }

    /// Highest ID whose record lies fully inside the body file.
    fn last_addressable_id(&self) -> SyndesResult<u64> {
        let record = self.layout().record_size();
        Ok((self.body_len()? / record).saturating_sub(1))
    }

    /// Read at an absolute offset. Returns false when the offset is entirely
    /// past the end of file; a partially present record is zero-filled.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> SyndesResult<bool> {
        let mut file: &File = &self.body_file;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(&self.body_path, e))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file
                .read(&mut buf[filled..])
                .map_err(|e| StoreError::io(&self.body_path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(false);
        }
        buf[filled..].fill(0);
        Ok(true)
    }

    fn read_record(&self, layout: &BodyLayout, id: StateId) -> SyndesResult<Option<Vec<u8>>> {
        if id.is_null() || id.get() > self.state_capacity {
            return Ok(None);
        }
        let mut buf = vec![0u8; layout.record_size() as usize];
        if !self.read_at(layout.offset_of(id), &mut buf)? {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    fn write_record(&mut self, state: &State) -> SyndesResult<()> {
        let layout = self.layout();
        let mut buf = vec![0u8; layout.record_size() as usize];
        layout.encode_record(state, &mut buf);
        let mut file: &File = &self.body_file;
        file.seek(SeekFrom::Start(layout.offset_of(state.id)))
            .and_then(|_| file.write_all(&buf))
            .map_err(|e| StoreError::io(&self.body_path, e))?;
        Ok(())
    }

    fn write_header(&mut self) -> SyndesResult<()> {
        let bytes = encode_header(&self.meta(), &self.events, &self.special);
        let mut file: &File = &self.header_file;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&bytes))
            .and_then(|_| self.header_file.set_len(bytes.len() as u64))
            .map_err(|e| StoreError::io(&self.header_path, e))?;
        Ok(())
    }
}

// Handles released without an explicit `close` still flush, best effort.
impl Drop for Automaton {
    fn drop(&mut self) {
        let _ = self.header_file.sync_all();
        let _ = self.body_file.sync_all();
    }
}

/// Sequential iterator over existing state records.
pub struct StateScan<'a> {
    file: &'a File,
    body_path: &'a Path,
    buf: Vec<u8>,
    layout: BodyLayout,
    next_id: u64,
    last_id: u64,
}

impl Iterator for StateScan<'_> {
    type Item = SyndesResult<State>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_id <= self.last_id {
            let id = StateId::new(self.next_id);
            self.next_id += 1;
            let mut file = self.file;
            let read = file
                .seek(SeekFrom::Start(self.layout.offset_of(id)))
                .and_then(|_| file.read_exact(&mut self.buf));
            if let Err(e) = read {
                return Some(Err(StoreError::io(self.body_path, e).into()));
            }
            if let Some(state) = self.layout.decode_record(id, &self.buf) {
                return Some(Ok(state));
            }
        }
        None
    }
}

/// Open a store file. `fresh` creates (truncating) a new file; otherwise the
/// file must already exist.
fn open_rw(path: &Path, fresh: bool) -> SyndesResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(fresh)
        .truncate(fresh)
        .open(path)
        .map_err(|e| StoreError::io(path, e).into())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn write_mapping(
    scratch: &File,
    body_path: &Path,
    old: StateId,
    new: u64,
) -> SyndesResult<()> {
    let mut file: &File = scratch;
    file.seek(SeekFrom::Start(old.get() * 8))
        .and_then(|_| file.write_all(&new.to_be_bytes()))
        .map_err(|e| StoreError::io(body_path, e))?;
    Ok(())
}

fn read_mapping(scratch: &File, body_path: &Path, old: StateId) -> SyndesResult<Option<StateId>> {
    if old.is_null() {
        return Ok(None);
    }
    let mut file: &File = scratch;
    file.seek(SeekFrom::Start(old.get() * 8))
        .map_err(|e| StoreError::io(body_path, e))?;
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < 8 {
        let n = file
            .read(&mut buf[filled..])
            .map_err(|e| StoreError::io(body_path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    buf[filled..].fill(0);
    let value = u64::from_be_bytes(buf);
    Ok((value != 0).then(|| StateId::new(value)))
}
