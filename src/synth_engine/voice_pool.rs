//! Fixed-capacity voice pool with voice stealing.

use std::cmp::Ordering;

use crate::synth_engine::voice::Voice;

pub struct VoicePool {
    voices: Vec<Voice>,
    next_play_order: u64,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            voices: (0..capacity).map(|_| Voice::new()).collect(),
            next_play_order: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Stamp for the next started voice; later voices compare as newer.
    pub fn next_play_order(&mut self) -> u64 {
        self.next_play_order += 1;
        self.next_play_order
    }

    /// Returns a free slot, stealing the least important voice when the pool is full.
    ///
    /// Voices belonging to `note_id` are never stolen, so a note-on cannot cut
    /// its own layers. Returns `None` when every slot belongs to that note.
    pub fn allocate(&mut self, note_id: u64) -> Option<&mut Voice> {
        if let Some(index) = self.voices.iter().position(|v| !v.active) {
            return Some(&mut self.voices[index]);
        }

        let victim = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.note.note_id != note_id)
            .min_by(|(_, a), (_, b)| a.cmp_importance(b))
            .map(|(index, _)| index)?;

        let voice = &mut self.voices[victim];
        log::debug!(
            "Stealing voice: key {} channel {:?} stage {:?}",
            voice.note.key,
            voice.note.channel,
            voice.stage()
        );
        voice.kill();
        Some(voice)
    }

    /// Resizes the pool; when shrinking, the least important voices are dropped.
    pub fn resize(&mut self, capacity: usize) {
        if capacity >= self.voices.len() {
            self.voices.resize_with(capacity, Voice::new);
            return;
        }

        // Most important first, inactive slots last.
        self.voices.sort_by(|a, b| match (a.active, b.active) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => b.cmp_importance(a),
        });
        let dropped = self.voices[capacity..].iter().filter(|v| v.active).count();
        if dropped > 0 {
            log::debug!("Shrinking voice pool to {} killed {} voices", capacity, dropped);
        }
        self.voices.truncate(capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter().filter(|v| v.active)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut().filter(|v| v.active)
    }

    /// Kills voices of `class` on the same channel, except those of the current note.
    pub fn kill_exclusive(&mut self, channel: Option<usize>, class: i32, note_id: u64) {
        for voice in self.iter_mut() {
            if voice.note.channel == channel
                && voice.note.note_id != note_id
                && voice.exclusive_class() == class
            {
                voice.kill();
            }
        }
    }

    pub fn kill_all(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }
}
