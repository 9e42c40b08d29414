use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::{SchedulerError, SchedulerResult};

/// 2020-01-01T00:00:00Z
const EPOCH_MS: i64 = 1_577_836_800_000;
const TIME_UNIT_MS: i64 = 10;
const BITS_TIME: u32 = 39;
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;
const SEQUENCE_MASK: u16 = (1 << BITS_SEQUENCE) - 1;

/// 全流程追踪号生成器（sonyflake布局）
///
/// `| 39位时间(10ms) | 8位序列号 | 16位机器号 |`，同一进程内单调递增。
pub struct TraceIdGenerator {
    machine_id: u16,
    state: Mutex<GeneratorState>,
}

#[derive(Default)]
struct GeneratorState {
    elapsed: i64,
    sequence: u16,
}

impl TraceIdGenerator {
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// 同一时间单位内序列号用尽时借用下一个单位，释放锁后再睡到该单位开始
    ///
    /// 等待时长为借用的单位数乘以10ms，其他线程不会被这次等待阻塞。
    pub fn next_id(&self) -> SchedulerResult<u64> {
        let (elapsed, sequence, overtime) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            let current = elapsed_units();
            let mut overtime = 0;
            if state.elapsed < current {
                state.elapsed = current;
                state.sequence = 0;
            } else {
                state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
                if state.sequence == 0 {
                    state.elapsed += 1;
                }
                overtime = state.elapsed - current;
            }

            if state.elapsed >= 1 << BITS_TIME {
                return Err(SchedulerError::IdGeneration(
                    "时间超出可表示范围".to_string(),
                ));
            }
            (state.elapsed, state.sequence, overtime)
        };

        if overtime > 0 {
            std::thread::sleep(sleep_time(overtime));
        }

        Ok((elapsed as u64) << (BITS_SEQUENCE + BITS_MACHINE)
            | u64::from(sequence) << BITS_MACHINE
            | u64::from(self.machine_id))
    }

    pub fn next_trace_id(&self) -> SchedulerResult<String> {
        self.next_id().map(|id| id.to_string())
    }

    /// 拆出追踪号中的毫秒时间戳和机器号
    pub fn decompose(id: u64) -> (i64, u16) {
        let elapsed = (id >> (BITS_SEQUENCE + BITS_MACHINE)) as i64;
        let machine_id = (id & ((1 << BITS_MACHINE) - 1)) as u16;
        (elapsed * TIME_UNIT_MS + EPOCH_MS, machine_id)
    }
}

fn elapsed_units() -> i64 {
    (Utc::now().timestamp_millis() - EPOCH_MS) / TIME_UNIT_MS
}

fn sleep_time(overtime_units: i64) -> Duration {
    let now_ms = Utc::now().timestamp_millis();
    let into_unit = (now_ms - EPOCH_MS) % TIME_UNIT_MS;
    let wait_ms = overtime_units * TIME_UNIT_MS - into_unit;
    Duration::from_millis(wait_ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let generator = TraceIdGenerator::new(3);
        let mut seen = HashSet::new();
        let mut last = 0;

        for _ in 0..2000 {
            let id = generator.next_id().unwrap();
            assert!(id > last);
            assert!(seen.insert(id));
            last = id;
        }
    }

    #[test]
    fn test_concurrent_ids_are_unique_and_not_ahead_of_clock() {
        let generator = std::sync::Arc::new(TraceIdGenerator::new(7));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = std::sync::Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| {
                            let id = generator.next_id().unwrap();
                            // 返回时追踪号里的时间已经到来
                            let (timestamp_ms, _) = TraceIdGenerator::decompose(id);
                            assert!(timestamp_ms <= Utc::now().timestamp_millis());
                            id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_decompose() {
        let generator = TraceIdGenerator::new(513);
        let before = Utc::now().timestamp_millis();
        let id = generator.next_id().unwrap();

        let (timestamp_ms, machine_id) = TraceIdGenerator::decompose(id);
        assert_eq!(machine_id, 513);
        assert!((timestamp_ms - before).abs() <= TIME_UNIT_MS);
    }

    #[test]
    fn test_trace_id_is_decimal() {
        let generator = TraceIdGenerator::new(1);
        let trace_id = generator.next_trace_id().unwrap();
        assert!(trace_id.parse::<u64>().is_ok());
    }
}
