use crate::{
    ChartKind, ColumnSort, Connection, EngineConfig, Error, ExecutionPolicy, FilterControl,
    LocalEngine, MyStyle, Notification, Orientation, Panel, PanelKind, PanelState,
    TradeViewError, TradeViewResult, bar_chart, heatmap, pick_folder, render_cycle, render_table,
    save_as,
};

use egui::{
    CentralPanel, Color32, Context, Frame, RichText, ScrollArea, Stroke, TopBottomPanel, Ui,
    style::Visuals, warn_if_debug_build, widgets,
};
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::oneshot::{self, Receiver, error::TryRecvError};
use tracing::{error, info};

/// Results delivered from background tasks to the UI thread.
#[derive(Debug)]
pub enum DashboardUpdate {
    /// Panels updated by a render cycle, tagged with the connection
    /// generation the cycle ran against.
    Panels { generation: u64, panels: Vec<Panel> },
    /// A new connection opened from the "Open folder" action.
    Connected(TradeViewResult<Connection>),
    /// Outcome of a CSV/Parquet export; `None` when the dialog was cancelled.
    Exported(TradeViewResult<Option<PathBuf>>),
}

/// What the user asked for while a panel was drawn.
#[derive(Debug, Default)]
struct PanelAction {
    rerun: bool,
    export: bool,
}

/// The main application struct for Trade View.
pub struct DashboardApp {
    /// The dashboard panels, in display order.
    panels: Vec<Panel>,
    /// View-only sort of each panel's table.
    sorts: HashMap<PanelKind, Option<ColumnSort>>,
    /// The one long-lived connection handle, shared read-only with every render cycle.
    connection: Arc<Connection>,
    /// Bumped on every new connection; cycles from older ones are discarded.
    generation: u64,
    policy: ExecutionPolicy,
    /// Optional Notification window for errors that do not belong to a panel.
    notification: Option<Box<dyn Notification>>,

    /// Tokio runtime for asynchronous operations (queries, dialogs, exports).
    runtime: tokio::runtime::Runtime,
    /// Channels for receiving the results of background tasks.
    pipes: Vec<Receiver<DashboardUpdate>>,
    /// Active asynchronous tasks.
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl DashboardApp {
    /// Creates the application, opens the connection and starts the initial load.
    pub fn new(cc: &eframe::CreationContext<'_>, config: &EngineConfig) -> TradeViewResult<Self> {
        cc.egui_ctx.set_style_init(Visuals::dark());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let connection = runtime.block_on(config.connect())?;
        info!("Connected: {connection}");

        let mut app = DashboardApp {
            panels: Panel::dashboard(),
            sorts: HashMap::new(),
            connection: Arc::new(connection),
            generation: 0,
            policy: config.policy.clone(),
            notification: None,
            runtime,
            pipes: Vec::new(),
            tasks: Vec::new(),
        };
        app.refresh_all(&cc.egui_ctx);
        Ok(app)
    }

    /// Checks if a Notification is active and displays it.
    fn check_notification(&mut self, ctx: &Context) {
        if let Some(notification) = &mut self.notification {
            if !notification.show(ctx) {
                self.notification = None;
            }
        }
    }

    fn notify(&mut self, message: String) {
        error!("{message}");
        self.notification = Some(Box::new(Error { message }));
    }

    /// Polls every pending background task without blocking.
    /// Returns `true` while at least one is still running.
    fn check_updates_pending(&mut self, ctx: &Context) -> bool {
        let mut pending = Vec::new();

        for mut pipe in std::mem::take(&mut self.pipes) {
            match pipe.try_recv() {
                Ok(update) => self.apply_update(update, ctx),
                Err(TryRecvError::Empty) => pending.push(pipe),
                Err(TryRecvError::Closed) => {
                    self.notify("Background task terminated without response.".to_string());
                }
            }
        }

        // Updates applied above may have started new tasks.
        self.pipes.extend(pending);
        !self.pipes.is_empty()
    }

    fn apply_update(&mut self, update: DashboardUpdate, ctx: &Context) {
        match update {
            DashboardUpdate::Panels { generation, panels } => {
                merge_panels(&mut self.panels, self.generation, generation, panels);
            }
            DashboardUpdate::Connected(Ok(connection)) => {
                info!("Connected: {connection}");
                self.connection = Arc::new(connection);
                self.generation += 1;
                // Options and selections belong to the old data source.
                self.panels = Panel::dashboard();
                self.sorts.clear();
                self.refresh_all(ctx);
            }
            DashboardUpdate::Connected(Err(err)) => {
                self.notify(format!("Failed to open snapshot folder: {err}"));
            }
            DashboardUpdate::Exported(Ok(Some(path))) => {
                info!("Saved {}", path.display());
            }
            DashboardUpdate::Exported(Ok(None)) => {}
            DashboardUpdate::Exported(Err(err)) => {
                self.notify(format!("Export failed: {err}"));
            }
        }
    }

    /// Spawns a task whose result is delivered through a new pipe.
    fn spawn_update<F>(&mut self, future: F, ctx: &Context)
    where
        F: Future<Output = DashboardUpdate> + Send + 'static,
    {
        self.tasks.retain(|task| !task.is_finished());

        let (tx, rx) = oneshot::channel::<DashboardUpdate>();
        self.pipes.push(rx);

        let ctx_clone = ctx.clone();
        let handle = self.runtime.spawn(async move {
            let update = future.await;
            if tx.send(update).is_err() {
                error!("Receiver dropped before the update could be sent.");
            }
            ctx_clone.request_repaint();
        });

        self.tasks.push(handle);
    }

    /// Runs a render cycle over the given panels (by kind).
    fn run_cycle(&mut self, kinds: &[PanelKind], reload_options: bool, ctx: &Context) {
        let mut batch = Vec::new();
        for panel in self.panels.iter_mut().filter(|p| kinds.contains(&p.kind)) {
            batch.push(panel.clone());
            panel.state = PanelState::Loading;
        }

        let generation = self.generation;
        let future = render_cycle(
            self.connection.clone(),
            self.policy.clone(),
            batch,
            reload_options,
        );
        let update = async move {
            DashboardUpdate::Panels {
                generation,
                panels: future.await,
            }
        };
        self.spawn_update(update, ctx);
    }

    /// Initial load and "Refresh": reload every filter's options, rerun every panel.
    fn refresh_all(&mut self, ctx: &Context) {
        self.run_cycle(&PanelKind::ALL, true, ctx);
    }

    fn open_folder(&mut self, ctx: &Context) {
        match self.runtime.block_on(pick_folder()) {
            Ok(dir) => {
                let future = async move {
                    let engine = LocalEngine::open(&dir).await;
                    DashboardUpdate::Connected(engine.map(Connection::Local))
                };
                self.spawn_update(future, ctx);
            }
            Err(TradeViewError::FileNotFound(_)) => {} // Dialog cancelled.
            Err(err) => self.notify(err.to_string()),
        }
    }

    fn export(&mut self, kind: PanelKind, ctx: &Context) {
        let Some(output) = self
            .panels
            .iter()
            .find(|p| p.kind == kind)
            .and_then(Panel::output)
        else {
            return;
        };

        let table = output.table.clone();
        let file_name = format!("{}.csv", kind.id());
        let future = save_as(table, file_name, ctx.clone());
        self.spawn_update(async move { DashboardUpdate::Exported(future.await) }, ctx);
    }

    fn render_top_bar(&mut self, ctx: &Context, busy: bool) {
        TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Trade View");
                ui.separator();

                let refresh = ui.add_enabled(!busy, egui::Button::new("⟳ Refresh"));
                if refresh.clicked() {
                    self.refresh_all(ctx);
                }

                if ui.button("📂 Open folder").clicked() {
                    self.open_folder(ctx);
                }

                ui.separator();
                ui.label(RichText::new(self.connection.describe()).weak());

                // Add spacing to align theme switch to the right.
                let delta = ui.available_width() - 15.0;
                if delta > 0.0 {
                    ui.add_space(delta);
                    widgets::global_theme_preference_switch(ui);
                }
            });
        });
    }

    fn render_bottom_bar(&self, ctx: &Context, busy: bool) {
        TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if busy {
                    ui.spinner();
                    let loading = self.panels.iter().filter(|p| p.is_loading()).count();
                    ui.label(format!("Loading {loading} panel(s)..."));
                } else {
                    let limit = self
                        .policy
                        .row_limit
                        .map_or("none".to_string(), |n| n.to_string());
                    ui.label(format!(
                        "timeout {:?} · retries {} · row limit {limit}",
                        self.policy.timeout, self.policy.retries
                    ));
                }
            });
        });
    }
}

/// Draws one panel: title, filter controls, then its result.
fn render_panel(ui: &mut Ui, panel: &mut Panel, sort: &mut Option<ColumnSort>) -> PanelAction {
    let mut action = PanelAction::default();

    Frame::group(ui.style()).show(ui, |ui| {
        ui.set_width(ui.available_width());
        ui.heading(panel.kind.title());

        let selections_before = panel.selections();
        let loading = panel.is_loading();
        ui.add_enabled_ui(!loading, |ui| {
            for control in &mut panel.filters {
                render_filter(ui, control);
            }
        });
        action.rerun = panel.selections() != selections_before;

        ui.separator();

        match &panel.state {
            PanelState::Idle => {
                ui.label("Waiting for data.");
            }
            PanelState::Loading => {
                ui.spinner();
            }
            PanelState::Failed(message) => {
                error_frame(ui, message);
            }
            PanelState::Ready(output) => {
                for warning in &output.warnings {
                    ui.colored_label(Color32::from_rgb(230, 160, 0), warning);
                }

                match (panel.kind.chart(), &output.matrix) {
                    (ChartKind::VerticalBars, Some(matrix)) => {
                        bar_chart(ui, matrix, Orientation::Vertical)
                    }
                    (ChartKind::HorizontalBars, Some(matrix)) => {
                        bar_chart(ui, matrix, Orientation::Horizontal)
                    }
                    (ChartKind::Heatmap, Some(matrix)) => heatmap(ui, matrix),
                    _ => render_table(ui, panel.kind.id(), &output.table, sort),
                }

                if panel.kind.chart() != ChartKind::Table {
                    ui.collapsing("Data", |ui| {
                        render_table(ui, panel.kind.id(), &output.table, sort);
                    });
                }

                if ui.button("💾 Export").clicked() {
                    action.export = true;
                }
            }
        }
    });

    action
}

/// Multi-select checkboxes with "All" / "None" shortcuts.
fn render_filter(ui: &mut Ui, control: &mut FilterControl) {
    ui.horizontal_wrapped(|ui| {
        ui.label(RichText::new(format!("{}:", control.label)).strong());

        for value in control.domain.clone() {
            let mut checked = control.selected.contains(&value);
            if ui.checkbox(&mut checked, &value).changed() {
                control.toggle(&value);
            }
        }

        if ui.small_button("All").clicked() {
            control.select_all();
        }
        if ui.small_button("None").clicked() {
            control.clear();
        }
    });

    if let Some(err) = &control.error {
        ui.colored_label(Color32::RED, format!("Options unavailable: {err}"));
    }
}

fn error_frame(ui: &mut Ui, message: &str) {
    Frame::default()
        .fill(Color32::from_rgb(255, 200, 200)) // Light red bg
        .stroke(Stroke::new(1.0, Color32::DARK_RED))
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.colored_label(Color32::BLACK, message);
        });
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.check_notification(ctx);
        let busy = self.check_updates_pending(ctx);

        //  | title  refresh  open  connection   theme |
        //  -------------------------------------------
        //  |  panel 1 (full width)                   |
        //  |  panel 2           |  panel 3           |
        //  |  panel 4           |                    |
        //  -------------------------------------------
        //  | status footer                           |

        self.render_top_bar(ctx, busy);
        self.render_bottom_bar(ctx, busy);

        let mut actions: Vec<(PanelKind, PanelAction)> = Vec::new();

        // CentralPanel must be added after all other panels in your egui layout!
        CentralPanel::default().show(ctx, |ui| {
            warn_if_debug_build(ui);

            let Self { panels, sorts, .. } = self;
            ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let Some((first, rest)) = panels.split_first_mut() else {
                        return;
                    };

                    let sort = sorts.entry(first.kind).or_default();
                    actions.push((first.kind, render_panel(ui, first, sort)));

                    for pair in rest.chunks_mut(2) {
                        ui.columns(2, |columns| {
                            for (column, panel) in columns.iter_mut().zip(pair.iter_mut()) {
                                let sort = sorts.entry(panel.kind).or_default();
                                actions.push((panel.kind, render_panel(column, panel, sort)));
                            }
                        });
                    }
                });
        });

        for (kind, action) in actions {
            if action.rerun {
                self.run_cycle(&[kind], false, ctx);
            }
            if action.export {
                self.export(kind, ctx);
            }
        }
    }
}

/// Replaces the panels of `current` with their updated versions.
///
/// Updates computed against an older connection are dropped, since their
/// results and filter domains come from the previous data source.
/// Returns `true` when the update was applied.
fn merge_panels(
    current: &mut [Panel],
    current_generation: u64,
    generation: u64,
    updated: Vec<Panel>,
) -> bool {
    if generation != current_generation {
        info!("Discarding {} panel(s) from a previous connection", updated.len());
        return false;
    }
    for panel in updated {
        if let Some(slot) = current.iter_mut().find(|p| p.kind == panel.kind) {
            *slot = panel;
        }
    }
    true
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_merge_panels`
#[cfg(test)]
mod tests_merge_panels {
    use super::*;

    fn failed(kind: PanelKind, message: &str) -> Panel {
        let mut panel = Panel::new(kind);
        panel.state = PanelState::Failed(message.to_string());
        panel
    }

    #[test]
    fn cycle_of_current_connection_is_applied() {
        let mut panels = Panel::dashboard();
        let applied = merge_panels(&mut panels, 1, 1, vec![failed(PanelKind::ALL[1], "boom")]);

        assert!(applied);
        assert_eq!(panels[1], failed(PanelKind::ALL[1], "boom"));
        assert_eq!(panels[0], Panel::new(PanelKind::ALL[0]));
    }

    #[test]
    fn cycle_of_previous_connection_is_dropped() {
        let mut panels = Panel::dashboard();
        let before = panels.clone();

        let stale = PanelKind::ALL.iter().map(|&kind| failed(kind, "old source")).collect();
        let applied = merge_panels(&mut panels, 1, 0, stale);

        assert!(!applied);
        assert_eq!(panels, before);
    }
}
