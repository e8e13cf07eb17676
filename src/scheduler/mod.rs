//! # Scheduler Façade
//!
//! The public query surface of the engine. The scheduler parses the query
//! text, picks a sampler, dispatches to the parallel kernel, runs the
//! statistical scaler, and wraps everything in a [`ValidationResult`] with
//! wall-clock timing. Public calls never panic and never abort: any
//! propagated failure becomes a result with `Status::Error`, zeroed numeric
//! fields, and the diagnostic text riding alongside.
//!
//! ## Fast/Slow Validation
//!
//! An approximate query produces its point estimate from one fast sampled
//! fold, then cross-checks it against a stream of slow validation passes:
//! phase-shifted low-rate systematic strides, each folded and scaled the
//! same way. The stability decision compares the fast value against the
//! mean of the slow estimates:
//!
//! ```text
//! STABLE             |fast - slow_mean| / |fast| <= error_threshold
//!                    and confidence >= target
//! DRIFTING           at least two slow estimates, but the check fails
//! INSUFFICIENT_DATA  fewer than two slow estimates (or an empty sample)
//! ERROR              any propagated failure
//! ```
//!
//! ## Cancellation and Timeouts
//!
//! Every query owns a [`CancelToken`]. A configured timeout arms a timer
//! thread that trips the token; convergence-checking samplers poll it and
//! return partials. A cancelled query is not an error: it reports
//! `DRIFTING` when any reductions were recorded, `INSUFFICIENT_DATA`
//! otherwise.

use std::time::{Duration, Instant};

use eyre::{bail, Result};
use hashbrown::HashMap;

use crate::config::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_ERROR_THRESHOLD,
    DEFAULT_MAX_ERROR_PERCENT, DEFAULT_NUM_THREADS, DEFAULT_SAMPLE_PERCENT,
    SLOW_VALIDATION_PASSES, SLOW_VALIDATION_STRIDE,
};
use crate::database::{timing, Database};
use crate::exec::{
    confidence_for_sample_size, estimate, fold_records, stability_status, Aggregate, AmountFilter,
    CancelToken, Status,
};
use crate::record::{Record, RECORD_SIZE};
use crate::sample::{CltParams, Sampler};
use crate::sql::parse_query;

/// The engine's standard return shape: point estimate, outcome status,
/// confidence, CI half-width, sample count, and timing. Numeric fields are
/// always defined (zero on failure) so downstream formatting cannot
/// itself fail.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub value: f64,
    pub status: Status,
    pub confidence_level: f64,
    pub error_margin: f64,
    pub samples_used: u64,
    pub computation_time: Duration,
    pub diagnostic: Option<String>,
}

impl ValidationResult {
    fn error(started: Instant, diagnostic: String) -> Self {
        Self {
            value: 0.0,
            status: Status::Error,
            confidence_level: 0.0,
            error_margin: 0.0,
            samples_used: 0,
            computation_time: started.elapsed(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// Per-call configuration, passed explicitly; the scheduler holds no
/// global tunables beyond its default error threshold.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Target sample fraction in `(0, 100]`; 0 or >= 100 routes to the
    /// exact path.
    pub sample_percent: f64,
    /// Worker count for the aggregation kernel.
    pub num_threads: usize,
    /// Stability tolerance for the fast/slow comparison.
    pub error_threshold: f64,
    /// Target confidence level (0.90, 0.95, or 0.99).
    pub confidence_level: f64,
    /// Convergence-check cadence for CLT samplers.
    pub check_interval: usize,
    /// CLT early-exit threshold on the relative half-width, in percent.
    pub max_error_percent: f64,
    /// Sampling strategy; `None` selects the deterministic systematic pass.
    pub sampler: Option<Sampler>,
    /// Wall-clock budget; on expiry the stop flag is set and partials are
    /// returned.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sample_percent: DEFAULT_SAMPLE_PERCENT,
            num_threads: DEFAULT_NUM_THREADS,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_error_percent: DEFAULT_MAX_ERROR_PERCENT,
            sampler: None,
            timeout: None,
        }
    }
}

impl QueryOptions {
    pub fn with_sample_percent(mut self, sample_percent: f64) -> Self {
        self.sample_percent = sample_percent;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// A CLT-validated sampler configured from these options.
    pub fn clt_sampler(&self) -> Sampler {
        Sampler::CltDualPointer(CltParams {
            confidence_level: self.confidence_level,
            check_interval: self.check_interval,
            num_threads: self.num_threads,
            max_error_percent: self.max_error_percent,
        })
    }

    fn effective_sampler(&self) -> Sampler {
        self.sampler.clone().unwrap_or_default()
    }
}

/// Per-group results of a `GROUP BY` query, keyed by the group value
/// rendered as text.
pub type GroupedResults = HashMap<String, ValidationResult>;

/// Side-by-side exact vs. approximate comparison.
#[derive(Debug, Clone)]
pub struct BenchmarkResults {
    pub exact_value: f64,
    pub approximate_value: f64,
    pub exact_time_ms: f64,
    pub approximate_time_ms: f64,
    pub speedup: f64,
    pub error_percentage: f64,
    pub threads_used: usize,
    pub sample_percentage: f64,
}

#[derive(Debug)]
pub struct Scheduler {
    db: Database,
    error_threshold: f64,
}

impl Scheduler {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    pub fn with_error_threshold(db: Database, error_threshold: f64) -> Self {
        Self {
            db,
            error_threshold,
        }
    }

    pub fn create(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(Database::create(path))
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn close(&self) -> Result<()> {
        self.db.close()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn insert_record(
        &self,
        id: i64,
        amount: f64,
        region: i32,
        product_id: i32,
        timestamp: i64,
    ) -> Result<()> {
        self.db
            .insert(Record::new(id, amount, region, product_id, timestamp))
    }

    pub fn insert_batch(&self, records: Vec<Record>) -> Result<()> {
        self.db.insert_batch(records)
    }

    // ------------------------------------------------------------------
    // Approximate query entry points
    // ------------------------------------------------------------------

    /// Parses the aggregate out of the query text and dispatches. Unknown
    /// aggregates and malformed queries come back as `Status::Error`.
    pub fn execute_query(&self, query: &str, options: &QueryOptions) -> ValidationResult {
        let started = Instant::now();
        let parse_started = Instant::now();
        let parsed = parse_query(query);
        timing::record_parse(parse_started);

        match parsed {
            Ok(q) => self.run_approximate(q.aggregate, q.filter, options, started),
            Err(err) => ValidationResult::error(started, format!("{err:#}")),
        }
    }

    pub fn execute_sum_query(&self, query: &str, options: &QueryOptions) -> ValidationResult {
        self.execute_fixed(Aggregate::Sum, query, options)
    }

    pub fn execute_avg_query(&self, query: &str, options: &QueryOptions) -> ValidationResult {
        self.execute_fixed(Aggregate::Avg, query, options)
    }

    pub fn execute_count_query(&self, query: &str, options: &QueryOptions) -> ValidationResult {
        self.execute_fixed(Aggregate::Count, query, options)
    }

    /// Entry points with a fixed aggregate still parse the text for the
    /// predicate, matching the shape of the query surface: the aggregate in
    /// the text is advisory, the predicate is not.
    fn execute_fixed(
        &self,
        aggregate: Aggregate,
        query: &str,
        options: &QueryOptions,
    ) -> ValidationResult {
        let started = Instant::now();
        let parse_started = Instant::now();
        let parsed = parse_query(query);
        timing::record_parse(parse_started);

        match parsed {
            Ok(q) => self.run_approximate(aggregate, q.filter, options, started),
            Err(err) => ValidationResult::error(started, format!("{err:#}")),
        }
    }

    /// Runs the aggregate per distinct group value. Grouping requires a
    /// `GROUP BY` clause naming one of the categorical columns; the group
    /// set is discovered by one exact scan and each group is then treated
    /// as its own population.
    pub fn execute_group_by_query(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<GroupedResults> {
        let parse_started = Instant::now();
        let parsed = parse_query(query)?;
        timing::record_parse(parse_started);

        let Some(group_column) = parsed.group_by else {
            bail!("no GROUP BY column in query");
        };
        let key_of: fn(&Record) -> i32 = match group_column.to_ascii_lowercase().as_str() {
            "region" => |r: &Record| r.region,
            "product_id" => |r: &Record| r.product_id,
            other => bail!("unknown GROUP BY column {other:?}"),
        };

        let population = self.db.all_records()?;
        let mut groups: HashMap<i32, Vec<Record>> = HashMap::new();
        for record in population {
            groups.entry(key_of(&record)).or_default().push(record);
        }

        let cancel = self.arm_timeout(options);
        let mut results = GroupedResults::with_capacity(groups.len());
        for (key, members) in groups {
            let started = Instant::now();
            let result = self.fold_population(
                &members,
                parsed.aggregate,
                parsed.filter,
                options,
                &cancel,
                started,
            );
            results.insert(key.to_string(), result);
        }
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Exact entry points
    // ------------------------------------------------------------------

    pub fn execute_exact_sum(&self) -> ValidationResult {
        self.run_exact(Aggregate::Sum, None)
    }

    pub fn execute_exact_avg(&self) -> ValidationResult {
        self.run_exact(Aggregate::Avg, None)
    }

    pub fn execute_exact_count(&self) -> ValidationResult {
        self.run_exact(Aggregate::Count, None)
    }

    pub fn execute_exact_sum_where(&self, min_amount: f64, max_amount: f64) -> ValidationResult {
        self.run_exact(
            Aggregate::Sum,
            Some(AmountFilter::new(min_amount, max_amount)),
        )
    }

    fn run_exact(&self, aggregate: Aggregate, filter: Option<AmountFilter>) -> ValidationResult {
        let started = Instant::now();
        match self.db.exact_reduction(filter) {
            Ok(reduction) => {
                let value = match aggregate {
                    Aggregate::Sum => reduction.sum,
                    Aggregate::Count => reduction.count as f64,
                    Aggregate::Avg => reduction.mean().unwrap_or(0.0),
                };
                ValidationResult {
                    value,
                    status: Status::Stable,
                    confidence_level: 1.0,
                    error_margin: 0.0,
                    samples_used: reduction.count,
                    computation_time: started.elapsed(),
                    diagnostic: None,
                }
            }
            Err(err) => ValidationResult::error(started, format!("{err:#}")),
        }
    }

    // ------------------------------------------------------------------
    // Benchmarking
    // ------------------------------------------------------------------

    pub fn benchmark_query(&self, aggregate: Aggregate, options: &QueryOptions) -> BenchmarkResults {
        let exact = match aggregate {
            Aggregate::Sum => self.execute_exact_sum(),
            Aggregate::Avg => self.execute_exact_avg(),
            Aggregate::Count => self.execute_exact_count(),
        };
        let query = match aggregate {
            Aggregate::Sum => "SELECT SUM(amount)",
            Aggregate::Avg => "SELECT AVG(amount)",
            Aggregate::Count => "SELECT COUNT(amount)",
        };
        let approx = self.execute_fixed(aggregate, query, options);

        let exact_time_ms = exact.computation_time.as_secs_f64() * 1e3;
        let approximate_time_ms = approx.computation_time.as_secs_f64() * 1e3;
        let speedup = if approximate_time_ms > 0.0 {
            exact_time_ms / approximate_time_ms
        } else {
            0.0
        };
        let error_percentage = if exact.value != 0.0 {
            (exact.value - approx.value).abs() / exact.value.abs() * 100.0
        } else {
            0.0
        };

        BenchmarkResults {
            exact_value: exact.value,
            approximate_value: approx.value,
            exact_time_ms,
            approximate_time_ms,
            speedup,
            error_percentage,
            threads_used: options.num_threads,
            sample_percentage: options.sample_percent,
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn total_records(&self) -> u64 {
        self.db.total_records()
    }

    pub fn tree_height(&self) -> u32 {
        self.db.tree_height()
    }

    pub fn database_size_mb(&self) -> f64 {
        (self.total_records() as usize * RECORD_SIZE) as f64 / (1024.0 * 1024.0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn arm_timeout(&self, options: &QueryOptions) -> CancelToken {
        let token = CancelToken::new();
        if let Some(timeout) = options.timeout {
            if timeout.is_zero() {
                // An already-expired budget: skip the timer thread.
                token.cancel();
            } else {
                let timer = token.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(timeout);
                    timer.cancel();
                });
            }
        }
        token
    }

    fn run_approximate(
        &self,
        aggregate: Aggregate,
        filter: Option<AmountFilter>,
        options: &QueryOptions,
        started: Instant,
    ) -> ValidationResult {
        if options.sample_percent <= 0.0 || options.sample_percent >= 100.0 {
            return self.run_exact(aggregate, filter);
        }

        let cancel = self.arm_timeout(options);
        let sample = match self
            .db
            .sample_cancellable(&options.effective_sampler(), options.sample_percent, &cancel)
        {
            Ok(sample) => sample,
            Err(err) => return ValidationResult::error(started, format!("{err:#}")),
        };

        if self.db.total_records() == 0 {
            return ValidationResult {
                value: 0.0,
                status: Status::InsufficientData,
                confidence_level: 0.0,
                error_margin: self.threshold(options),
                samples_used: 0,
                computation_time: started.elapsed(),
                diagnostic: None,
            };
        }

        let fold_started = Instant::now();
        let reduction = fold_records(&sample, filter, options.num_threads);
        timing::record_fold(fold_started);

        let scaled = estimate(
            &reduction,
            aggregate,
            options.sample_percent,
            options.confidence_level,
        );

        if cancel.is_cancelled() {
            let status = if reduction.count > 0 {
                Status::Drifting
            } else {
                Status::InsufficientData
            };
            return ValidationResult {
                value: scaled.value,
                status,
                confidence_level: confidence_for_sample_size(reduction.count),
                error_margin: self.threshold(options),
                samples_used: reduction.count,
                computation_time: started.elapsed(),
                diagnostic: Some("cancelled before completion; partial result".into()),
            };
        }

        if reduction.count < 2 {
            // Tiny populations round the sample target down to nothing; the
            // point estimate falls back to the exact fold while the status
            // reports that the CI path had too little data.
            let (value, samples_used) = if reduction.count == 0 {
                match self.db.exact_reduction(filter) {
                    Ok(full) => {
                        let scaled = estimate(&full, aggregate, 100.0, options.confidence_level);
                        (scaled.value, full.count)
                    }
                    Err(err) => return ValidationResult::error(started, format!("{err:#}")),
                }
            } else {
                (scaled.value, reduction.count)
            };
            return ValidationResult {
                value,
                status: Status::InsufficientData,
                confidence_level: confidence_for_sample_size(samples_used),
                error_margin: self.threshold(options),
                samples_used,
                computation_time: started.elapsed(),
                diagnostic: None,
            };
        }

        let slow_estimates = match self.slow_validation(aggregate, filter, options) {
            Ok(values) => values,
            Err(err) => return ValidationResult::error(started, format!("{err:#}")),
        };

        let confidence = confidence_for_sample_size(reduction.count);
        let status = stability_status(
            scaled.value,
            &slow_estimates,
            self.threshold(options),
            confidence,
            options.confidence_level,
        );

        ValidationResult {
            value: scaled.value,
            status,
            confidence_level: confidence,
            error_margin: if scaled.has_ci {
                scaled.half_width
            } else {
                self.threshold(options)
            },
            samples_used: reduction.count,
            computation_time: started.elapsed(),
            diagnostic: None,
        }
    }

    /// Aggregates one in-memory population (a single group) the same way
    /// `run_approximate` treats the whole table.
    fn fold_population(
        &self,
        population: &[Record],
        aggregate: Aggregate,
        filter: Option<AmountFilter>,
        options: &QueryOptions,
        cancel: &CancelToken,
        started: Instant,
    ) -> ValidationResult {
        if population.is_empty() {
            return ValidationResult {
                value: 0.0,
                status: Status::InsufficientData,
                confidence_level: 0.0,
                error_margin: self.threshold(options),
                samples_used: 0,
                computation_time: started.elapsed(),
                diagnostic: None,
            };
        }

        let exact_path =
            options.sample_percent <= 0.0 || options.sample_percent >= 100.0;
        let sample = if exact_path {
            population.to_vec()
        } else {
            options
                .effective_sampler()
                .sample_slice(population, options.sample_percent, cancel)
        };

        let fold_started = Instant::now();
        let reduction = fold_records(&sample, filter, options.num_threads);
        timing::record_fold(fold_started);

        let percent = if exact_path {
            100.0
        } else {
            options.sample_percent
        };
        let scaled = estimate(&reduction, aggregate, percent, options.confidence_level);

        if reduction.count < 2 {
            let (value, samples_used) = if reduction.count == 0 {
                let full = fold_records(population, filter, 1);
                let full_scaled = estimate(&full, aggregate, 100.0, options.confidence_level);
                (full_scaled.value, full.count)
            } else {
                (scaled.value, reduction.count)
            };
            return ValidationResult {
                value,
                status: Status::InsufficientData,
                confidence_level: confidence_for_sample_size(samples_used),
                error_margin: self.threshold(options),
                samples_used,
                computation_time: started.elapsed(),
                diagnostic: None,
            };
        }

        let slow_estimates =
            slow_passes_over(population, aggregate, filter, options.confidence_level);
        let confidence = confidence_for_sample_size(reduction.count);
        let status = if exact_path {
            Status::Stable
        } else {
            stability_status(
                scaled.value,
                &slow_estimates,
                self.threshold(options),
                confidence,
                options.confidence_level,
            )
        };

        ValidationResult {
            value: scaled.value,
            status,
            confidence_level: if exact_path { 1.0 } else { confidence },
            error_margin: if scaled.has_ci {
                scaled.half_width
            } else {
                self.threshold(options)
            },
            samples_used: reduction.count,
            computation_time: started.elapsed(),
            diagnostic: None,
        }
    }

    /// Slow validation stream over the whole table.
    fn slow_validation(
        &self,
        aggregate: Aggregate,
        filter: Option<AmountFilter>,
        options: &QueryOptions,
    ) -> Result<Vec<f64>> {
        let population = self.db.all_records()?;
        Ok(slow_passes_over(
            &population,
            aggregate,
            filter,
            options.confidence_level,
        ))
    }

    fn threshold(&self, options: &QueryOptions) -> f64 {
        if options.error_threshold > 0.0 {
            options.error_threshold
        } else {
            self.error_threshold
        }
    }
}

/// Runs the phase-shifted slow validation passes: each pass strides the
/// population at `SLOW_VALIDATION_STRIDE` from a different offset, folds,
/// and scales exactly like the fast path.
fn slow_passes_over(
    population: &[Record],
    aggregate: Aggregate,
    filter: Option<AmountFilter>,
    confidence_level: f64,
) -> Vec<f64> {
    let total = population.len();
    if total == 0 {
        return Vec::new();
    }
    let slow_percent = 100.0 / SLOW_VALIDATION_STRIDE as f64;
    let phase = SLOW_VALIDATION_STRIDE / SLOW_VALIDATION_PASSES;

    let mut estimates = Vec::with_capacity(SLOW_VALIDATION_PASSES);
    for pass in 0..SLOW_VALIDATION_PASSES {
        let offset = pass * phase;
        let mut reduction = crate::exec::Reduction::default();
        let mut i = offset;
        while i < total {
            let record = &population[i];
            match filter {
                Some(f) if !f.matches(record) => {}
                _ => reduction.accumulate(record.amount),
            }
            i += SLOW_VALIDATION_STRIDE;
        }
        if reduction.count == 0 {
            continue;
        }
        let scaled = estimate(&reduction, aggregate, slow_percent, confidence_level);
        estimates.push(scaled.value);
    }
    estimates
}
