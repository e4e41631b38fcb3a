use crate::filter::FilterParams;

/// Seoul city hall; where the map opens.
pub const DEFAULT_MAP_CENTER: (f64, f64) = (37.5665, 126.9780);
pub const DEFAULT_MAP_ZOOM: u8 = 11;
const MAX_MAP_ZOOM: u8 = 18;

/// Per-session UI state, owned by whoever drives the interaction loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub filters: FilterParams,
    pub map_center: (f64, f64),
    pub map_zoom: u8,
    /// Row positions within the current filtered view.
    selected_rows: Vec<usize>,
    /// Customer table generation the selection refers to.
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            filters: FilterParams::default(),
            map_center: DEFAULT_MAP_CENTER,
            map_zoom: DEFAULT_MAP_ZOOM,
            selected_rows: Vec::new(),
            generation: 0,
        }
    }
}

impl Session {
    /// Replace the filters. A different filter set reshapes the view, so the
    /// selection is cleared.
    pub fn set_filters(&mut self, filters: FilterParams) {
        if filters != self.filters {
            self.selected_rows.clear();
        }
        self.filters = filters;
    }

    /// Follow the customer table generation. Positions taken against an
    /// older table are meaningless after a reload, so they are dropped.
    pub fn sync_generation(&mut self, generation: u64) {
        if generation != self.generation {
            self.selected_rows.clear();
            self.generation = generation;
        }
    }

    /// Store a selection, dropping positions outside a view of `view_len`
    /// rows and duplicates. Returns the rows that were kept.
    pub fn select_rows(&mut self, rows: &[usize], view_len: usize) -> &[usize] {
        let mut kept: Vec<usize> = rows.iter().copied().filter(|r| *r < view_len).collect();
        kept.sort_unstable();
        kept.dedup();
        self.selected_rows = kept;
        &self.selected_rows
    }

    pub fn selected_rows(&self) -> &[usize] {
        &self.selected_rows
    }

    pub fn set_viewport(&mut self, center: (f64, f64), zoom: u8) {
        self.map_center = center;
        self.map_zoom = zoom.clamp(1, MAX_MAP_ZOOM);
    }
}
