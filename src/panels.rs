use crate::{
    ExecutionPolicy, FilterSelection, Measure, QueryEngine, QuerySpec, RenderCycle, ResultMatrix,
    ResultTable, TradeViewResult, reshape,
};

use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::{debug, error, info};

/// Values of the `TRADE_CATEGORY` column, assigned upstream by the stream enrichment job.
pub const TRADE_CATEGORIES: [&str; 2] = ["HIGH", "LOW"];

/// How a panel draws its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    /// The raw `ResultTable`.
    Table,
    /// One group per row label, one bar per column label, value printed on each bar.
    VerticalBars,
    /// Like `VerticalBars`, with the bars laid out horizontally.
    HorizontalBars,
    /// Colour-coded matrix, every present cell annotated with its value.
    Heatmap,
}

/// The four panels of the trade dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    TradeValueBySymbolSide,
    TradeCountByGender,
    TradeValueByRegionGender,
    AvgPriceByRegionSymbol,
}

impl PanelKind {
    pub const ALL: [PanelKind; 4] = [
        PanelKind::TradeValueBySymbolSide,
        PanelKind::TradeCountByGender,
        PanelKind::TradeValueByRegionGender,
        PanelKind::AvgPriceByRegionSymbol,
    ];

    pub fn title(self) -> &'static str {
        match self {
            PanelKind::TradeValueBySymbolSide => "Total Trade Value by Symbol and Side",
            PanelKind::TradeCountByGender => "Count of HIGH and LOW Value Trades by Gender",
            PanelKind::TradeValueByRegionGender => "Total Trade Value by Region and Gender",
            PanelKind::AvgPriceByRegionSymbol => "Average Price by Region and Symbol",
        }
    }

    /// Stable id used for egui widget ids and export file names.
    pub fn id(self) -> &'static str {
        match self {
            PanelKind::TradeValueBySymbolSide => "trade_value_by_symbol_side",
            PanelKind::TradeCountByGender => "trade_count_by_gender",
            PanelKind::TradeValueByRegionGender => "trade_value_by_region_gender",
            PanelKind::AvgPriceByRegionSymbol => "avg_price_by_region_symbol",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            PanelKind::TradeValueBySymbolSide => "enriched",
            _ => "trade_user",
        }
    }

    pub fn group_by(self) -> [&'static str; 2] {
        match self {
            PanelKind::TradeValueBySymbolSide => ["SYMBOL", "SIDE"],
            PanelKind::TradeCountByGender => ["GENDER", "TRADE_CATEGORY"],
            PanelKind::TradeValueByRegionGender => ["REGIONID", "GENDER"],
            PanelKind::AvgPriceByRegionSymbol => ["REGIONID", "SYMBOL"],
        }
    }

    pub fn measure(self) -> Measure {
        match self {
            PanelKind::TradeValueBySymbolSide | PanelKind::TradeValueByRegionGender => {
                Measure::sum("TOTAL_TRADE_VALUE", "TOTAL_TRADE_VALUE")
            }
            PanelKind::TradeCountByGender => Measure::count_rows("VALUE_TRADE_COUNT"),
            PanelKind::AvgPriceByRegionSymbol => Measure::avg("PRICE", "AVG_PRICE"),
        }
    }

    pub fn chart(self) -> ChartKind {
        match self {
            PanelKind::TradeValueBySymbolSide => ChartKind::Table,
            PanelKind::TradeCountByGender => ChartKind::VerticalBars,
            PanelKind::TradeValueByRegionGender => ChartKind::HorizontalBars,
            PanelKind::AvgPriceByRegionSymbol => ChartKind::Heatmap,
        }
    }

    /// `(row dimension, column dimension)` of the pivot, `None` for table panels.
    pub fn pivot(self) -> Option<(&'static str, &'static str)> {
        match self {
            PanelKind::TradeValueBySymbolSide => None,
            PanelKind::TradeCountByGender => Some(("TRADE_CATEGORY", "GENDER")),
            PanelKind::TradeValueByRegionGender => Some(("REGIONID", "GENDER")),
            PanelKind::AvgPriceByRegionSymbol => Some(("REGIONID", "SYMBOL")),
        }
    }

    fn filter_controls(self) -> Vec<FilterControl> {
        match self {
            PanelKind::TradeValueBySymbolSide => Vec::new(),
            PanelKind::TradeCountByGender => vec![
                FilterControl::distinct("GENDER", "Gender", "trade_user"),
                FilterControl::fixed("TRADE_CATEGORY", "Trade category", &TRADE_CATEGORIES),
            ],
            PanelKind::TradeValueByRegionGender => {
                vec![FilterControl::distinct("REGIONID", "Region", "trade_user")]
            }
            PanelKind::AvgPriceByRegionSymbol => {
                vec![FilterControl::distinct("SYMBOL", "Symbol", "enriched")]
            }
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Where a filter control gets its options from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionSource {
    /// `SELECT DISTINCT <column> FROM <table>`, reloaded on every full refresh.
    Distinct { table: &'static str },
    /// A fixed domain known in advance.
    Fixed,
}

/// A multi-select control over one categorical column.
///
/// `selected` is always a subset of `domain`. Options start fully selected.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterControl {
    pub column: &'static str,
    pub label: &'static str,
    pub source: OptionSource,
    /// Options in the order the engine returned them.
    pub domain: Vec<String>,
    pub selected: BTreeSet<String>,
    /// Last option-loading failure, shown next to the control.
    pub error: Option<String>,
    loaded: bool,
}

impl FilterControl {
    fn distinct(column: &'static str, label: &'static str, table: &'static str) -> Self {
        FilterControl {
            column,
            label,
            source: OptionSource::Distinct { table },
            domain: Vec::new(),
            selected: BTreeSet::new(),
            error: None,
            loaded: false,
        }
    }

    fn fixed(column: &'static str, label: &'static str, values: &[&str]) -> Self {
        let mut control = FilterControl {
            source: OptionSource::Fixed,
            ..FilterControl::distinct(column, label, "")
        };
        control.set_domain(values.iter().map(|v| v.to_string()).collect());
        control
    }

    /// Replaces the options.
    ///
    /// The first load selects everything. Later loads keep the user's choice,
    /// dropping values that disappeared from the domain.
    pub fn set_domain(&mut self, domain: Vec<String>) {
        if self.loaded {
            self.selected.retain(|value| domain.contains(value));
        } else {
            self.selected = domain.iter().cloned().collect();
            self.loaded = true;
        }
        self.domain = domain;
        self.error = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn select_all(&mut self) {
        self.selected = self.domain.iter().cloned().collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Flips one option; values outside the domain are ignored.
    pub fn toggle(&mut self, value: &str) {
        if !self.selected.remove(value) && self.domain.iter().any(|v| v == value) {
            self.selected.insert(value.to_string());
        }
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection::new(self.column, self.selected.iter().cloned())
    }
}

/// A successful panel run: the raw table, its pivot and user-facing warnings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelOutput {
    pub table: ResultTable,
    pub matrix: Option<ResultMatrix>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PanelState {
    #[default]
    Idle,
    Loading,
    Ready(Arc<PanelOutput>),
    Failed(String),
}

/// One dashboard panel: what to query, the user's filters and the last outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub kind: PanelKind,
    pub filters: Vec<FilterControl>,
    pub state: PanelState,
}

impl Panel {
    pub fn new(kind: PanelKind) -> Self {
        Panel {
            kind,
            filters: kind.filter_controls(),
            state: PanelState::Idle,
        }
    }

    /// The full set of panels, in display order.
    pub fn dashboard() -> Vec<Panel> {
        PanelKind::ALL.into_iter().map(Panel::new).collect()
    }

    /// The aggregation query for the current selections.
    pub fn query_spec(&self) -> QuerySpec {
        self.filters.iter().fold(
            QuerySpec::new(self.kind.table(), self.kind.measure()).group_by(self.kind.group_by()),
            |spec, control| spec.filter(control.selection()),
        )
    }

    /// Current selections, used to detect edits between frames.
    pub fn selections(&self) -> Vec<BTreeSet<String>> {
        self.filters.iter().map(|f| f.selected.clone()).collect()
    }

    pub fn output(&self) -> Option<&Arc<PanelOutput>> {
        match &self.state {
            PanelState::Ready(output) => Some(output),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == PanelState::Loading
    }

    /// Refreshes the options of every `Distinct` filter. Failures stay on the control.
    async fn load_options<E: QueryEngine>(&mut self, cycle: &mut RenderCycle<E>) {
        for control in &mut self.filters {
            let OptionSource::Distinct { table } = control.source else {
                continue;
            };
            match cycle.distinct_values(control.column, table).await {
                Ok(values) => {
                    debug!("{}: {} options for {}", self.kind.id(), values.len(), control.column);
                    control.set_domain(values);
                }
                Err(err) => {
                    error!("Failed to load options for {}: {err}", control.column);
                    control.error = Some(err.to_string());
                }
            }
        }
    }
}

/// Runs one panel query and pivots the result when the panel draws a chart.
pub async fn run_panel<E: QueryEngine>(
    cycle: &mut RenderCycle<E>,
    panel: &Panel,
) -> TradeViewResult<PanelOutput> {
    let spec = panel.query_spec();
    let table = cycle.run_spec(&spec).await?;

    let warnings = panel
        .filters
        .iter()
        .filter(|control| control.selected.is_empty())
        .map(|control| format!("No {} selected: nothing to show.", control.label))
        .collect();

    let matrix = match panel.kind.pivot() {
        Some((row_dim, col_dim)) => Some(reshape(&table, row_dim, col_dim, &spec.measure.alias)?),
        None => None,
    };

    Ok(PanelOutput {
        table,
        matrix,
        warnings,
    })
}

/// Runs a render cycle over `panels`, strictly one panel after the other.
///
/// With `reload_options` the filter options are fetched first (full refresh);
/// otherwise the current selections are queried as they are. A failing panel
/// records its error and the remaining panels still run.
pub async fn render_cycle<E: QueryEngine>(
    engine: Arc<E>,
    policy: ExecutionPolicy,
    mut panels: Vec<Panel>,
    reload_options: bool,
) -> Vec<Panel> {
    let mut cycle = RenderCycle::new(engine, policy);

    for panel in &mut panels {
        if reload_options {
            panel.load_options(&mut cycle).await;
        }

        panel.state = match run_panel(&mut cycle, panel).await {
            Ok(output) => PanelState::Ready(Arc::new(output)),
            Err(err) => {
                error!("Panel '{}' failed: {err}", panel.kind);
                PanelState::Failed(err.to_string())
            }
        };
    }

    info!(
        "render_cycle(): {} panel(s), {} distinct queries",
        panels.len(),
        cycle.executed()
    );
    panels
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_panels`
#[cfg(test)]
mod tests_panels {
    use super::*;
    use crate::LocalEngine;
    use polars::prelude::*;
    use std::{path::PathBuf, time::Duration};

    fn engine(with_enriched: bool) -> TradeViewResult<Arc<LocalEngine>> {
        let trade_user = df!(
            "GENDER" => &["M", "M", "F", "F", "M"],
            "TRADE_CATEGORY" => &["HIGH", "LOW", "HIGH", "LOW", "HIGH"],
            "REGIONID" => &["Region_1", "Region_1", "Region_2", "Region_2", "Region_2"],
            "SYMBOL" => &["AAA", "BBB", "AAA", "AAA", "BBB"],
            "PRICE" => &[10.0, 20.0, 30.0, 50.0, 40.0],
            "TOTAL_TRADE_VALUE" => &[1000i64, 200, 3000, 500, 4000],
        )?;
        let enriched = df!(
            "SYMBOL" => &["AAA", "AAA", "BBB"],
            "SIDE" => &["BUY", "SELL", "BUY"],
            "TOTAL_TRADE_VALUE" => &[100i64, 200, 300],
        )?;

        let mut tables = vec![("trade_user".to_string(), trade_user)];
        if with_enriched {
            tables.push(("enriched".to_string(), enriched));
        }
        Ok(Arc::new(LocalEngine::from_tables(PathBuf::from("memory"), tables)))
    }

    fn policy() -> ExecutionPolicy {
        ExecutionPolicy {
            retries: 0,
            backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn find(panels: &[Panel], kind: PanelKind) -> &Panel {
        panels
            .iter()
            .find(|p| p.kind == kind)
            .expect("panel present")
    }

    #[test]
    fn query_spec_uses_current_selection() -> TradeViewResult<()> {
        let mut panel = Panel::new(PanelKind::TradeCountByGender);
        panel.filters[0].set_domain(vec!["M".into(), "F".into()]);
        panel.filters[0].toggle("F");

        assert_eq!(
            panel.query_spec().build()?,
            "SELECT GENDER, TRADE_CATEGORY, COUNT(*) AS VALUE_TRADE_COUNT FROM trade_user \
             WHERE GENDER IN ('M') AND TRADE_CATEGORY IN ('HIGH','LOW') \
             GROUP BY GENDER, TRADE_CATEGORY"
        );
        Ok(())
    }

    #[test]
    fn later_loads_keep_the_selection() {
        let mut control = FilterControl::distinct("REGIONID", "Region", "trade_user");
        control.set_domain(vec!["Region_1".into(), "Region_2".into()]);
        control.toggle("Region_1");
        control.set_domain(vec!["Region_1".into(), "Region_3".into()]);

        assert!(control.selected.is_empty());
        control.toggle("Region_9");
        assert!(control.selected.is_empty());
        control.select_all();
        assert_eq!(control.selected.len(), 2);
    }

    #[tokio::test]
    async fn full_cycle_selects_whole_domains() -> TradeViewResult<()> {
        let panels = render_cycle(engine(true)?, policy(), Panel::dashboard(), true).await;

        let gender = find(&panels, PanelKind::TradeCountByGender);
        assert_eq!(gender.filters[0].selected.len(), 2);
        let output = gender.output().expect("ready");
        let matrix = output.matrix.as_ref().expect("pivoted");
        assert_eq!(matrix.get("HIGH", "M"), Some(2.0));
        assert_eq!(matrix.get("LOW", "F"), Some(1.0));
        assert!(output.warnings.is_empty());

        let region = find(&panels, PanelKind::TradeValueByRegionGender);
        let matrix = region.output().and_then(|o| o.matrix.as_ref()).expect("pivoted");
        assert_eq!(matrix.get("Region_2", "M"), Some(4000.0));
        assert_eq!(matrix.get("Region_1", "F"), None);

        let price = find(&panels, PanelKind::AvgPriceByRegionSymbol);
        let matrix = price.output().and_then(|o| o.matrix.as_ref()).expect("pivoted");
        assert_eq!(matrix.get("Region_2", "AAA"), Some(40.0));

        let symbol_side = find(&panels, PanelKind::TradeValueBySymbolSide);
        let output = symbol_side.output().expect("ready");
        assert!(output.matrix.is_none());
        assert_eq!(output.table.height(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn empty_selection_warns_and_renders_nothing() -> TradeViewResult<()> {
        let mut panels = render_cycle(engine(true)?, policy(), Panel::dashboard(), true).await;

        let region = panels
            .iter_mut()
            .find(|p| p.kind == PanelKind::TradeValueByRegionGender)
            .expect("panel present");
        region.filters[0].clear();

        let rerun = render_cycle(engine(true)?, policy(), vec![region.clone()], false).await;
        let output = rerun[0].output().expect("ready");
        assert!(output.table.is_empty());
        assert!(output.matrix.as_ref().is_some_and(ResultMatrix::is_empty));
        assert_eq!(output.warnings, vec!["No Region selected: nothing to show."]);
        Ok(())
    }

    #[tokio::test]
    async fn failing_panel_does_not_stop_the_others() -> TradeViewResult<()> {
        // Without `enriched` the first panel and the SYMBOL options fail.
        let panels = render_cycle(engine(false)?, policy(), Panel::dashboard(), true).await;

        let symbol_side = find(&panels, PanelKind::TradeValueBySymbolSide);
        assert!(matches!(symbol_side.state, PanelState::Failed(_)));

        let price = find(&panels, PanelKind::AvgPriceByRegionSymbol);
        assert!(price.filters[0].error.is_some());

        let gender = find(&panels, PanelKind::TradeCountByGender);
        assert!(gender.output().is_some());
        Ok(())
    }
}
