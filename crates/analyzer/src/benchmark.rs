//! The benchmark chain: equity benchmark, then the primary coin, then the leader coins.

use chrono::NaiveDate;
use configuration::Benchmarks;
use core_types::{BenchmarkChainStatus, BenchmarkSnapshot, DailyRecord, Phase};
use database::{DbError, RecordStore};

/// Which parts of the chain an asset is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainScope {
    pub equity: bool,
    pub primary_coin: bool,
    pub leaders: bool,
}

impl ChainScope {
    /// Equity-flagged assets sit outside the chain. The primary coin is never
    /// compared with itself, and neither it nor a leader is compared with the leaders.
    pub fn for_record(record: &DailyRecord, benchmarks: &Benchmarks) -> Self {
        if record.is_benchmark_equity || record.is_domestic_equity {
            return Self {
                equity: false,
                primary_coin: false,
                leaders: false,
            };
        }
        let is_primary_coin = record.asset == benchmarks.primary_coin;
        Self {
            equity: true,
            primary_coin: !is_primary_coin,
            leaders: !is_primary_coin && !record.is_benchmark_leader,
        }
    }
}

/// The chain's records for one date.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkDay {
    pub equity: Option<DailyRecord>,
    pub primary_coin: Option<DailyRecord>,
    /// Ordered by asset id.
    pub leaders: Vec<DailyRecord>,
}

impl BenchmarkDay {
    pub async fn load(
        store: &dyn RecordStore,
        date: NaiveDate,
        benchmarks: &Benchmarks,
    ) -> Result<Self, DbError> {
        Ok(Self {
            equity: store.get(&benchmarks.equity_benchmark, date).await?,
            primary_coin: store.get(&benchmarks.primary_coin, date).await?,
            leaders: store.benchmark_leaders(date).await?,
        })
    }

    /// A display snapshot of the parts of the chain `record` is compared against.
    pub fn status_for(&self, record: &DailyRecord, benchmarks: &Benchmarks) -> BenchmarkChainStatus {
        let scope = ChainScope::for_record(record, benchmarks);
        BenchmarkChainStatus {
            equity: self.equity.as_ref().filter(|_| scope.equity).map(BenchmarkSnapshot::from),
            primary_coin: self
                .primary_coin
                .as_ref()
                .filter(|_| scope.primary_coin)
                .map(BenchmarkSnapshot::from),
            leaders: if scope.leaders {
                self.leaders.iter().map(BenchmarkSnapshot::from).collect()
            } else {
                Vec::new()
            },
        }
    }

    /// Whether the chain above `record` is all in Entry.
    ///
    /// The equity benchmark, the primary coin and equity-flagged assets always
    /// pass. A leader needs the equity benchmark and the primary coin in Entry.
    /// Any other asset additionally needs at least one leader, all in Entry.
    pub fn chain_passes(&self, record: &DailyRecord, benchmarks: &Benchmarks) -> bool {
        if record.is_benchmark_equity
            || record.is_domestic_equity
            || record.asset == benchmarks.primary_coin
        {
            return true;
        }

        let in_entry = |r: &Option<DailyRecord>| r.as_ref().is_some_and(|r| r.phase == Phase::Entry);
        let upstream = in_entry(&self.equity) && in_entry(&self.primary_coin);

        if record.is_benchmark_leader {
            return upstream;
        }

        upstream
            && !self.leaders.is_empty()
            && self.leaders.iter().all(|leader| leader.phase == Phase::Entry)
    }
}
