use crate::{
    ExecutionPolicy, QueryEngine, QuerySpec, ResultTable, TradeViewError, TradeViewResult,
    UniqueElements, build_distinct,
};

use std::{collections::HashMap, sync::Arc};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Executes one query with the policy's per-attempt timeout and bounded retry.
///
/// Only transient failures (`Connection`, `Timeout`) are retried, waiting
/// `backoff * 2^attempt` in between. Engine rejections (`Query`) and decoding
/// problems are returned at once.
pub async fn execute<E>(
    engine: &E,
    sql: &str,
    policy: &ExecutionPolicy,
) -> TradeViewResult<ResultTable>
where
    E: QueryEngine,
{
    let mut attempt: u32 = 0;
    loop {
        debug!("execute(): attempt {} {sql}", attempt + 1);

        let error = match timeout(policy.timeout, engine.submit(sql)).await {
            Ok(Ok(table)) => {
                debug!("execute(): {} rows x {} columns", table.height(), table.width());
                return Ok(table);
            }
            Ok(Err(error)) => error,
            Err(_elapsed) => TradeViewError::Timeout(policy.timeout),
        };

        if !error.is_transient() || attempt >= policy.retries {
            return Err(error);
        }

        let delay = policy.backoff.saturating_mul(2u32.saturating_pow(attempt));
        warn!(
            "execute(): {error}; retry {}/{} in {delay:?}",
            attempt + 1,
            policy.retries
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Fetches the distinct values of `column` in `table`, for a selection control.
///
/// Nulls are skipped and duplicates removed, keeping the engine's order.
pub async fn distinct_values<E>(
    engine: &E,
    column: &str,
    table: &str,
    policy: &ExecutionPolicy,
) -> TradeViewResult<Vec<String>>
where
    E: QueryEngine,
{
    let sql = build_distinct(table, column, policy.row_limit)?;
    let result = execute(engine, &sql, policy).await?;
    Ok(single_column(&result))
}

fn single_column(result: &ResultTable) -> Vec<String> {
    let mut values: Vec<String> = result
        .column_values(0)
        .filter(|value| !value.is_null())
        .map(|value| value.to_string())
        .collect();
    values.unique();
    values
}

/// One render cycle: every query of a dashboard refresh runs through it.
///
/// Identical query strings are executed once per cycle. The cache lives only
/// as long as the cycle, so the next refresh always sees fresh data.
pub struct RenderCycle<E: QueryEngine> {
    engine: Arc<E>,
    policy: ExecutionPolicy,
    cache: HashMap<String, ResultTable>,
}

impl<E: QueryEngine> RenderCycle<E> {
    pub fn new(engine: Arc<E>, policy: ExecutionPolicy) -> Self {
        RenderCycle {
            engine,
            policy,
            cache: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Executes `sql`, or returns the table already fetched in this cycle.
    pub async fn run(&mut self, sql: &str) -> TradeViewResult<ResultTable> {
        if let Some(table) = self.cache.get(sql) {
            debug!("RenderCycle: cache hit for {sql}");
            return Ok(table.clone());
        }

        let table = execute(self.engine.as_ref(), sql, &self.policy).await?;
        self.cache.insert(sql.to_string(), table.clone());
        Ok(table)
    }

    /// Builds and executes a panel query.
    ///
    /// A query with an empty filter cannot match anything, so the engine is
    /// skipped and an empty table with the expected columns is returned.
    /// An engine reply without any schema (Pinot omits `resultTable` when no
    /// segment matches) gets the same columns.
    pub async fn run_spec(&mut self, spec: &QuerySpec) -> TradeViewResult<ResultTable> {
        let spec = spec.clone().limit(self.policy.row_limit);
        if spec.matches_nothing() {
            debug!("RenderCycle: empty selection on {:?}", spec.empty_filters());
            return Ok(ResultTable::empty(spec.output_columns()));
        }
        let sql = spec.build()?;
        let table = self.run(&sql).await?;
        if table.columns.is_empty() && table.rows.is_empty() {
            return Ok(ResultTable::empty(spec.output_columns()));
        }
        Ok(table)
    }

    /// `distinct_values` through the cycle cache.
    pub async fn distinct_values(
        &mut self,
        column: &str,
        table: &str,
    ) -> TradeViewResult<Vec<String>> {
        let sql = build_distinct(table, column, self.policy.row_limit)?;
        let result = self.run(&sql).await?;
        Ok(single_column(&result))
    }

    /// Number of distinct queries executed so far.
    pub fn executed(&self) -> usize {
        self.cache.len()
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
