// ==========================================
// 单线生产排程引擎 - 班次日历
// ==========================================
// 职责: 在固定日班次 (如 08:00-16:00, 每天开班) 上推进时间
// 红线: 所有工时计算必须经过 add_working_minutes,
//       直接加 Duration 会让工序跨过夜间停线时段
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use chrono::{Days, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: i64 = 3_600;

// ==========================================
// WorkingCalendar - 班次日历
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingCalendar {
    shift_start_hour: u32,
    shift_end_hour: u32,
}

impl WorkingCalendar {
    /// 创建班次日历
    ///
    /// # 参数
    /// - shift_start_hour: 开班整点 (0..24)
    /// - shift_end_hour: 收班整点 (start < end <= 24)
    pub fn new(shift_start_hour: u32, shift_end_hour: u32) -> EngineResult<Self> {
        if shift_start_hour >= shift_end_hour || shift_end_hour > 24 {
            return Err(EngineError::InvalidShift {
                start_hour: shift_start_hour,
                end_hour: shift_end_hour,
            });
        }
        Ok(Self {
            shift_start_hour,
            shift_end_hour,
        })
    }

    pub fn shift_start_hour(&self) -> u32 {
        self.shift_start_hour
    }

    pub fn shift_end_hour(&self) -> u32 {
        self.shift_end_hour
    }

    /// 每班分钟数 = (end - start) × 60
    pub fn minutes_per_shift(&self) -> u64 {
        u64::from(self.shift_end_hour - self.shift_start_hour) * 60
    }

    fn shift_start_secs(&self) -> i64 {
        i64::from(self.shift_start_hour) * SECONDS_PER_HOUR
    }

    fn shift_end_secs(&self) -> i64 {
        i64::from(self.shift_end_hour) * SECONDS_PER_HOUR
    }

    /// 当天开班时刻
    fn shift_start_on(&self, t: NaiveDateTime) -> NaiveDateTime {
        t.date().and_time(chrono::NaiveTime::MIN) + Duration::seconds(self.shift_start_secs())
    }

    /// 次日开班时刻
    fn next_shift_start(&self, t: NaiveDateTime) -> NaiveDateTime {
        self.shift_start_on(t) + Duration::days(1)
    }

    /// 是否处于班内 [start, end)
    pub fn is_within_shift(&self, t: NaiveDateTime) -> bool {
        let secs = i64::from(t.num_seconds_from_midnight());
        secs >= self.shift_start_secs() && secs < self.shift_end_secs()
    }

    /// 对齐到班内
    ///
    /// - 早于开班: 当天开班
    /// - 到达/晚于收班: 次日开班
    /// - 班内: 原样返回
    ///
    /// 幂等: snap(snap(t)) == snap(t)
    pub fn snap_to_shift(&self, t: NaiveDateTime) -> NaiveDateTime {
        let secs = i64::from(t.num_seconds_from_midnight());
        if secs < self.shift_start_secs() {
            self.shift_start_on(t)
        } else if secs >= self.shift_end_secs() {
            self.next_shift_start(t)
        } else {
            t
        }
    }

    /// 在班次上推进 minutes 分钟工时
    ///
    /// 先耗尽当班剩余,再按整班跳日,余数落在最后一天的班内。
    /// 恰好耗尽当班时落在次日开班,结果永远不会落在收班时刻或之后。
    /// minutes = 0 原样返回; 超出日期可表示范围返回 HorizonOverflow。
    pub fn add_working_minutes(&self, t: NaiveDateTime, minutes: u64) -> EngineResult<NaiveDateTime> {
        if minutes == 0 {
            return Ok(t);
        }
        let overflow = || EngineError::HorizonOverflow { from: t, minutes };

        let current = self.snap_to_shift(t);
        let remaining = i64::try_from(minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .ok_or_else(overflow)?;
        let left_in_shift = self.shift_end_secs() - i64::from(current.num_seconds_from_midnight());

        if remaining < left_in_shift {
            return current
                .checked_add_signed(Duration::seconds(remaining))
                .ok_or_else(overflow);
        }

        let spill = remaining - left_in_shift;
        let shift_secs = self.shift_end_secs() - self.shift_start_secs();
        let days = u64::try_from(spill / shift_secs + 1).map_err(|_| overflow())?;

        self.shift_start_on(current)
            .checked_add_days(Days::new(days))
            .and_then(|day| day.checked_add_signed(Duration::seconds(spill % shift_secs)))
            .ok_or_else(overflow)
    }

    /// 两个班内时刻之间的工时分钟数 (from <= to)
    pub fn working_minutes_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> u64 {
        if to <= from {
            return 0;
        }
        let mut current = self.snap_to_shift(from);
        let mut total_secs: i64 = 0;

        while current < to {
            let shift_end = self.shift_start_on(current)
                + Duration::seconds(self.shift_end_secs() - self.shift_start_secs());
            if to <= shift_end {
                total_secs += (to - current).num_seconds();
                break;
            }
            total_secs += (shift_end - current).num_seconds();
            current = self.next_shift_start(current);
        }

        u64::try_from(total_secs / 60).unwrap_or(0)
    }
}

impl Default for WorkingCalendar {
    fn default() -> Self {
        Self {
            shift_start_hour: 8,
            shift_end_hour: 16,
        }
    }
}
