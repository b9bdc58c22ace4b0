use crate::state::Direction;
use crate::surface::OverlayId;
use crate::wire::EncodedImage;

#[derive(Debug, Clone, PartialEq)]
pub struct CarouselEntry {
    pub timestamp: String,
    pub image: EncodedImage,
    pub overlay: OverlayId,
}

/// Ordered, navigable set of per-timestamp overlays. `current` is `Some` iff
/// there is at least one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayCarousel {
    entries: Vec<CarouselEntry>,
    current: Option<usize>,
}

impl OverlayCarousel {
    /// Builds a carousel positioned on the first entry. Repeated timestamps
    /// keep their first occurrence.
    pub fn new(entries: Vec<CarouselEntry>) -> Self {
        let mut unique: Vec<CarouselEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !unique.iter().any(|e| e.timestamp == entry.timestamp) {
                unique.push(entry);
            }
        }
        let current = if unique.is_empty() { None } else { Some(0) };
        Self {
            entries: unique,
            current,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn order(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.timestamp.clone()).collect()
    }

    pub fn entries(&self) -> &[CarouselEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&CarouselEntry> {
        self.current.and_then(|idx| self.entries.get(idx))
    }

    pub fn current_timestamp(&self) -> Option<&str> {
        self.current().map(|e| e.timestamp.as_str())
    }

    pub fn position(&self, timestamp: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.timestamp == timestamp)
    }

    pub fn image(&self, timestamp: &str) -> Option<&EncodedImage> {
        self.entries
            .iter()
            .find(|e| e.timestamp == timestamp)
            .map(|e| &e.image)
    }

    pub fn get(&self, index: usize) -> Option<&CarouselEntry> {
        self.entries.get(index)
    }

    /// Moves one step with wrap-around in both directions. Returns the
    /// previous and new index.
    pub fn step(&mut self, direction: Direction) -> Option<(usize, usize)> {
        let current = self.current?;
        let len = self.entries.len() as isize;
        let next = (current as isize + direction.offset()).rem_euclid(len) as usize;
        self.current = Some(next);
        Some((current, next))
    }

    /// Jumps to `index`, returning the previous index.
    pub fn jump(&mut self, index: usize) -> Option<usize> {
        let previous = self.current?;
        if index >= self.entries.len() {
            return None;
        }
        self.current = Some(index);
        Some(previous)
    }

    pub fn overlay_ids(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.entries.iter().map(|e| e.overlay)
    }
}
