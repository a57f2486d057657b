use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use crate::canvas::{BeadGrid, Bounds, CanvasState, Cell};
use crate::components::history::HistoryManager;
use crate::components::selection::{PressOutcome, Selection};
use crate::components::tools::{
    self, StrokeTracker, Tool, ToolState, WandAction, WandSelection,
};
use crate::io::{self, DraftError, DraftRecord, ExportSheet};
use crate::ops::SourceImage;
use crate::ops::denoise::{DenoiseOutcome, denoise};
use crate::ops::palette_convert::{ConvertOutcome, convert_palette};
use crate::ops::pattern_sampler::{Calibration, sample_pattern};
use crate::ops::rasterize::rasterize_photo;
use crate::palette::{ColorId, Palette};
use crate::settings::EditorSettings;

/// Image → grid conversion waiting to run.
#[derive(Clone, Debug)]
pub enum ConversionRequest {
    /// Downsample a photo to `target_width` cells.
    Photo { image: SourceImage, target_width: u32 },
    /// Digitize a photographed pattern through a calibrated overlay.
    Pattern { image: SourceImage, calibration: Calibration },
}

/// One open pattern and everything editing it needs.
pub struct EditorSession {
    pub id: Uuid,
    pub title: String,
    pub canvas: CanvasState,
    pub history: HistoryManager,
    pub tools: ToolState,
    pub selection: Selection,
    pub settings: EditorSettings,
    palette: Palette,
    stroke: StrokeTracker,
    pending_conversion: Option<ConversionRequest>,
    pending_wand: Option<WandSelection>,
    pub is_dirty: bool,
    /// Seconds since the Unix epoch of the last change.
    pub last_modified: u64,
}

impl EditorSession {
    pub fn new(title: impl Into<String>, bounds: Bounds, palette: Palette, settings: EditorSettings) -> Self {
        let mut canvas = CanvasState::new(bounds);
        canvas.expand = settings.expand_config();
        let history = HistoryManager::new(settings.max_undo_steps + 1);
        let tools = ToolState {
            tool: Tool::Pen,
            selected_color: palette.colors().first().map(|c| c.id().to_string()),
        };
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            canvas,
            history,
            tools,
            selection: Selection::default(),
            settings,
            palette,
            stroke: StrokeTracker::default(),
            pending_conversion: None,
            pending_wand: None,
            is_dirty: false,
            last_modified: crate::logger::unix_seconds(),
        }
    }

    /// Empty canvas of exactly `width × height` cells.
    pub fn new_fixed(
        title: impl Into<String>,
        width: u32,
        height: u32,
        palette: Palette,
        settings: EditorSettings,
    ) -> Self {
        Self::new(title, Bounds::fixed(width, height), palette, settings)
    }

    /// Empty canvas that grows as you draw near its edges.
    pub fn new_free(title: impl Into<String>, palette: Palette, settings: EditorSettings) -> Self {
        let size = settings.free_initial_size;
        Self::new(title, Bounds::free(size, size), palette, settings)
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn grid(&self) -> &BeadGrid {
        &self.canvas.grid
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
        self.last_modified = crate::logger::unix_seconds();
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.title)
        } else {
            self.title.clone()
        }
    }

    /// Choose the paint color.  Ids not in the palette are refused.
    pub fn select_color(&mut self, id: &str) -> bool {
        if self.palette.get(id).is_none() {
            return false;
        }
        self.tools.selected_color = Some(id.to_string());
        true
    }

    /// Switch tools.  Any floating selection is stamped down first and any
    /// open stroke is finished.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.tools.tool == tool {
            return;
        }
        self.finish_stroke();
        self.commit_selection();
        self.pending_wand = None;
        self.tools.tool = tool;
        crate::log_info!("Tool: {}", tool.label());
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    pub fn pointer_down(&mut self, cell: Cell) {
        match self.tools.tool {
            Tool::Pen => {
                let Some(color) = self.tools.selected_color.clone() else {
                    return;
                };
                self.stroke.start(&self.canvas.grid, "Pen Stroke");
                if tools::paint(&mut self.canvas, cell, &color) {
                    self.stroke.record();
                }
            }
            Tool::Eraser => {
                self.stroke.start(&self.canvas.grid, "Eraser Stroke");
                if tools::erase(&mut self.canvas, cell) {
                    self.stroke.record();
                }
            }
            Tool::ColorPicker => {
                tools::pick(&self.canvas.grid, cell, &mut self.tools);
            }
            Tool::Fill => {
                let Some(color) = self.tools.selected_color.clone() else {
                    return;
                };
                let outcome =
                    tools::flood_fill(&mut self.canvas, cell, &color, self.settings.flood_fill_cap);
                if outcome.filled > 0 && self.history.commit(&self.canvas.grid, "Fill") {
                    self.mark_dirty();
                }
            }
            Tool::MagicWand => {
                self.wand_probe(cell);
            }
            Tool::Marquee => {
                let outcome = self.selection.press(cell, &mut self.canvas, &mut self.history);
                if outcome == PressOutcome::CommittedAndStartedMarquee {
                    self.mark_dirty();
                }
            }
        }
    }

    pub fn pointer_move(&mut self, cell: Cell) {
        match self.tools.tool {
            Tool::Pen if self.stroke.is_active => {
                let Some(color) = self.tools.selected_color.clone() else {
                    return;
                };
                if tools::paint(&mut self.canvas, cell, &color) {
                    self.stroke.record();
                }
            }
            Tool::Eraser if self.stroke.is_active => {
                if tools::erase(&mut self.canvas, cell) {
                    self.stroke.record();
                }
            }
            Tool::Marquee => self.selection.drag_to(cell),
            _ => {}
        }
    }

    pub fn pointer_up(&mut self) {
        let tool = self.tools.tool;
        if tool.is_stroke_tool() {
            self.finish_stroke();
        } else if tool == Tool::Marquee {
            self.selection.release(&mut self.canvas);
        }
    }

    /// Abort the stroke in progress and put the grid back as it was.
    pub fn cancel_stroke(&mut self) {
        if let Some(before) = self.stroke.cancel() {
            self.canvas.grid = before;
        }
    }

    fn finish_stroke(&mut self) {
        if self.stroke.finish(&self.canvas.grid, &mut self.history) {
            self.mark_dirty();
        }
    }

    // ========================================================================
    // MAGIC WAND
    // ========================================================================

    /// Select every cell sharing the color under `cell`.  Returns the count.
    pub fn wand_probe(&mut self, cell: Cell) -> Option<usize> {
        self.pending_wand = tools::magic_wand_select(&self.canvas.grid, cell);
        self.pending_wand.as_ref().map(WandSelection::count)
    }

    pub fn pending_wand(&self) -> Option<&WandSelection> {
        self.pending_wand.as_ref()
    }

    pub fn cancel_wand(&mut self) {
        self.pending_wand = None;
    }

    pub fn confirm_wand_delete(&mut self) -> usize {
        self.apply_pending_wand(WandAction::Delete)
    }

    /// Replace every wand-selected cell with the selected color.
    pub fn confirm_wand_replace(&mut self) -> usize {
        let Some(color) = self.tools.selected_color.clone() else {
            return 0;
        };
        self.apply_pending_wand(WandAction::Replace(color))
    }

    fn apply_pending_wand(&mut self, action: WandAction) -> usize {
        let Some(selection) = self.pending_wand.take() else {
            return 0;
        };
        let changed = tools::apply_wand(&mut self.canvas, &selection, &action, &mut self.history);
        if changed > 0 {
            self.mark_dirty();
        }
        changed
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    /// Stamp down the floating selection (tool switch, save, export).
    pub fn commit_selection(&mut self) -> bool {
        let committed = self.selection.commit(&mut self.canvas, &mut self.history);
        if committed {
            self.mark_dirty();
        }
        committed
    }

    pub fn cancel_selection(&mut self) {
        self.selection.cancel(&mut self.canvas);
    }

    pub fn delete_selection(&mut self) -> bool {
        let deleted = self.selection.delete(&self.canvas, &mut self.history);
        if deleted {
            self.mark_dirty();
        }
        deleted
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn undo(&mut self) -> bool {
        self.settle_transient_state();
        match self.history.undo() {
            Some(grid) => {
                self.canvas.grid = grid.clone();
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.settle_transient_state();
        match self.history.redo() {
            Some(grid) => {
                self.canvas.grid = grid.clone();
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Roll back uncommitted edits so the grid matches the history cursor.
    fn settle_transient_state(&mut self) {
        self.cancel_stroke();
        self.cancel_selection();
        self.pending_wand = None;
    }

    // ========================================================================
    // WHOLE-GRID OPERATIONS
    // ========================================================================

    /// One denoise pass; `threshold` defaults to the configured value.
    pub fn denoise(&mut self, threshold: Option<f64>) -> DenoiseOutcome {
        self.finish_stroke();
        self.commit_selection();
        let threshold = threshold.unwrap_or(self.settings.denoise_threshold);
        let outcome = denoise(&self.canvas.grid, &self.canvas.bounds, &self.palette, threshold);
        self.canvas.grid = outcome.grid.clone();
        if self.history.commit(&self.canvas.grid, "Denoise") {
            self.mark_dirty();
        }
        outcome
    }

    /// Re-map the pattern onto `target` and make it the session palette.
    pub fn convert_palette(&mut self, target: Palette, with_denoise: bool) -> ConvertOutcome {
        self.finish_stroke();
        self.commit_selection();
        let threshold = with_denoise.then_some(self.settings.denoise_threshold);
        let outcome =
            convert_palette(&self.canvas.grid, &self.canvas.bounds, &self.palette, &target, threshold);
        self.canvas.grid = outcome.grid.clone();
        self.tools.selected_color = match self.tools.selected_color.take() {
            Some(id) if target.get(&id).is_some() => Some(id),
            Some(id) => self.palette.get(&id).map(|c| target.nearest(c.rgb()).id().to_string()),
            None => None,
        };
        self.palette = target;
        if self.history.commit(&self.canvas.grid, "Convert Palette") {
            self.mark_dirty();
        }
        outcome
    }

    // ========================================================================
    // DEFERRED CONVERSION
    // ========================================================================

    /// Schedule a conversion to run on the next [`process_pending`](Self::process_pending).
    /// A newer request replaces an older one still waiting.
    pub fn queue_conversion(&mut self, request: ConversionRequest) {
        if self.pending_conversion.is_some() {
            crate::log_info!("Replacing queued conversion with a newer request");
        }
        self.pending_conversion = Some(request);
    }

    pub fn has_pending_conversion(&self) -> bool {
        self.pending_conversion.is_some()
    }

    pub fn take_pending_conversion(&mut self) -> Option<ConversionRequest> {
        self.pending_conversion.take()
    }

    /// Run the queued conversion to completion.  The result replaces the
    /// grid on a fixed canvas sized to the output and starts a fresh
    /// history.  Returns the new canvas size.
    pub fn process_pending(&mut self) -> Option<(u32, u32)> {
        let request = self.take_pending_conversion()?;
        let start = Instant::now();
        let alpha = self.settings.alpha_threshold;
        let (grid, width, height) = match request {
            ConversionRequest::Photo { image, target_width } => {
                let raster =
                    rasterize_photo(&image, target_width, &self.palette, &self.settings.raster_options());
                (raster.grid, raster.width, raster.height)
            }
            ConversionRequest::Pattern { image, calibration } => {
                let grid = sample_pattern(&image, &calibration, &self.palette, alpha);
                (grid, calibration.cols.max(1), calibration.rows.max(1))
            }
        };

        self.stroke = StrokeTracker::default();
        self.selection = Selection::default();
        self.pending_wand = None;
        let mut canvas = CanvasState::with_grid(grid, Bounds::fixed(width, height));
        canvas.expand = self.settings.expand_config();
        canvas.viewport = self.canvas.viewport;
        self.canvas = canvas;
        self.history.reset(self.canvas.grid.clone());
        self.mark_dirty();

        crate::log_info!(
            "Conversion finished: {}x{} canvas, {} beads in {:.0}ms",
            width,
            height,
            self.canvas.grid.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Some((width, height))
    }

    // ========================================================================
    // RENDER / EXPORT VIEWS
    // ========================================================================

    /// Base grid with the floating selection composited at its offset.
    pub fn visible_cells(&self) -> BeadGrid {
        let mut out = self.canvas.grid.clone();
        if let Some(floating) = self.selection.floating() {
            for (cell, id) in floating.placed_cells() {
                out.set(cell, id.clone());
            }
        }
        out
    }

    /// Bead counts of everything currently visible, most used first.
    pub fn bead_counts(&self) -> Vec<(ColorId, usize)> {
        self.visible_cells().color_counts(&self.palette)
    }

    /// Normalized pattern for the sheet renderer.  Stamps down any floating
    /// selection first.
    pub fn export(&mut self) -> ExportSheet {
        self.finish_stroke();
        self.commit_selection();
        ExportSheet::new(self.title.clone(), &self.canvas.grid, &self.canvas.bounds)
    }

    // ========================================================================
    // DRAFTS
    // ========================================================================

    pub fn to_draft(&mut self) -> DraftRecord {
        let sheet = self.export();
        let thumbnail = match io::encode_png(&sheet.to_thumbnail(&self.palette, io::THUMBNAIL_MAX_EDGE)) {
            Ok(bytes) => bytes,
            Err(e) => {
                crate::log_warn!("Draft thumbnail failed: {}", e);
                Vec::new()
            }
        };
        let viewport = self.canvas.viewport;
        DraftRecord::new(
            self.id.to_string(),
            self.title.clone(),
            &self.canvas.grid,
            &self.canvas.bounds,
            (viewport.pan_x, viewport.pan_y),
            viewport.zoom,
            self.last_modified,
            thumbnail,
        )
    }

    pub fn save_draft(&mut self, path: &Path) -> Result<(), DraftError> {
        let draft = self.to_draft();
        io::save_draft(&draft, path)?;
        self.mark_clean();
        crate::log_info!("Saved draft '{}' ({} beads) to {}", self.title, draft.grid.len(), path.display());
        Ok(())
    }

    /// Rebuild a session from a draft record.  Falls back to an empty
    /// default canvas (logged) when the record is unusable.
    pub fn from_draft(draft: &DraftRecord, palette: Palette, settings: EditorSettings) -> Self {
        let Some(bounds) = draft.bounds() else {
            crate::log_warn!("Draft '{}' has invalid bounds; starting empty", draft.title);
            return Self::fallback(palette, settings);
        };
        let mut session = Self::new(draft.title.clone(), bounds, palette, settings);
        if let Ok(id) = Uuid::parse_str(&draft.id) {
            session.id = id;
        } else {
            crate::log_warn!("Draft id '{}' is not a UUID; assigned a new one", draft.id);
        }
        session.canvas.grid = draft.decode_grid();
        session.canvas.viewport.pan_x = draft.offset_x;
        session.canvas.viewport.pan_y = draft.offset_y;
        if draft.zoom.is_finite() && draft.zoom > 0.0 {
            session.canvas.viewport.zoom = draft.zoom;
        }
        session.history.reset(session.canvas.grid.clone());
        session.last_modified = draft.last_modified;
        session
    }

    /// Open a draft file.  Any failure is logged and yields an empty session.
    pub fn open_draft(path: &Path, palette: Palette, settings: EditorSettings) -> Self {
        match io::load_draft(path) {
            Ok(draft) => Self::from_draft(&draft, palette, settings),
            Err(e) => {
                crate::log_warn!("Failed to load draft {}: {}; starting empty", path.display(), e);
                Self::fallback(palette, settings)
            }
        }
    }

    fn fallback(palette: Palette, settings: EditorSettings) -> Self {
        let size = settings.default_target_width;
        Self::new_fixed("Untitled", size, size, palette, settings)
    }
}
