// ==========================================
// 单线生产排程引擎 - 订单排序器
// ==========================================
// 职责: 对待排订单集合给出全序
// 规则:
// - 各策略是订单集合 (及 SLACK 的当前时刻) 的纯函数
// - 键相同按输入顺序 (稳定排序),保证输出确定
// - 交期优先为基准策略: 更早交期永远排在更高优先级之前
// ==========================================

use crate::domain::order::Order;
use crate::engine::bom::BillOfMaterials;
use crate::engine::error::EngineResult;
use crate::engine::strategy::SequencingPolicy;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// 预计算的排序键
#[derive(Debug, Clone)]
struct SortKey {
    deadline: NaiveDateTime,
    priority: u8,
    total_minutes: Option<u64>,
    slack_minutes: Option<i64>,
    tier_rank: u32,
    manual_rank: usize,
}

type Comparator = fn(&SortKey, &SortKey) -> Ordering;

/// None (未知产品) 排在最后
fn cmp_known_first<T: Ord>(a: Option<T>, b: Option<T>, reverse: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            if reverse {
                y.cmp(&x)
            } else {
                x.cmp(&y)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_deadline(a: &SortKey, b: &SortKey) -> Ordering {
    a.deadline
        .cmp(&b.deadline)
        .then_with(|| a.priority.cmp(&b.priority))
}

fn by_priority(a: &SortKey, b: &SortKey) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.deadline.cmp(&b.deadline))
}

fn by_shortest_job(a: &SortKey, b: &SortKey) -> Ordering {
    cmp_known_first(a.total_minutes, b.total_minutes, false)
}

fn by_longest_job(a: &SortKey, b: &SortKey) -> Ordering {
    cmp_known_first(a.total_minutes, b.total_minutes, true)
}

fn by_least_slack(a: &SortKey, b: &SortKey) -> Ordering {
    cmp_known_first(a.slack_minutes, b.slack_minutes, false)
}

fn by_customer_tier(a: &SortKey, b: &SortKey) -> Ordering {
    a.tier_rank
        .cmp(&b.tier_rank)
        .then_with(|| a.deadline.cmp(&b.deadline))
        .then_with(|| a.priority.cmp(&b.priority))
}

fn by_manual(a: &SortKey, b: &SortKey) -> Ordering {
    a.manual_rank.cmp(&b.manual_rank)
}

/// 策略 → 比较器 查找表
const COMPARATORS: [(SequencingPolicy, Comparator); 7] = [
    (SequencingPolicy::DeadlineFirst, by_deadline),
    (SequencingPolicy::PriorityFirst, by_priority),
    (SequencingPolicy::ShortestJobFirst, by_shortest_job),
    (SequencingPolicy::LongestJobFirst, by_longest_job),
    (SequencingPolicy::LeastSlackFirst, by_least_slack),
    (SequencingPolicy::CustomerTier, by_customer_tier),
    (SequencingPolicy::Manual, by_manual),
];

fn comparator_for(policy: SequencingPolicy) -> Comparator {
    COMPARATORS
        .iter()
        .find(|(p, _)| *p == policy)
        .map(|(_, cmp)| *cmp)
        .unwrap_or(by_deadline)
}

// ==========================================
// OrderSequencer - 订单排序器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct OrderSequencer {
    policy: SequencingPolicy,
    customer_tiers: HashMap<String, u32>,
    manual_sequence: Vec<String>,
}

impl OrderSequencer {
    pub fn new(policy: SequencingPolicy) -> Self {
        Self {
            policy,
            customer_tiers: HashMap::new(),
            manual_sequence: Vec::new(),
        }
    }

    /// 按名称构造; 未知名称报错
    pub fn from_name(name: &str) -> EngineResult<Self> {
        Ok(Self::new(name.parse()?))
    }

    /// 客户等级 (越小越优先; 未配置客户排最后)
    pub fn with_customer_tiers(mut self, tiers: HashMap<String, u32>) -> Self {
        self.customer_tiers = tiers;
        self
    }

    /// 人工顺序 (订单ID 序列)
    pub fn with_manual_sequence(mut self, order_ids: Vec<String>) -> Self {
        self.manual_sequence = order_ids;
        self
    }

    pub fn policy(&self) -> SequencingPolicy {
        self.policy
    }

    fn build_key(&self, order: &Order, bom: &BillOfMaterials, now: NaiveDateTime) -> SortKey {
        let total_minutes = bom.total_minutes(&order.product_code, order.quantity).ok();
        let slack_minutes = total_minutes.map(|m| {
            (order.deadline - now).num_minutes() - i64::try_from(m).unwrap_or(i64::MAX)
        });
        let tier_rank = self
            .customer_tiers
            .get(&order.customer)
            .copied()
            .unwrap_or(u32::MAX);
        let manual_rank = self
            .manual_sequence
            .iter()
            .position(|id| *id == order.order_id)
            .unwrap_or(usize::MAX);

        SortKey {
            deadline: order.deadline,
            priority: order.priority,
            total_minutes,
            slack_minutes,
            tier_rank,
            manual_rank,
        }
    }

    /// 按策略排序
    pub fn sequence(&self, orders: Vec<Order>, bom: &BillOfMaterials, now: NaiveDateTime) -> Vec<Order> {
        let cmp = comparator_for(self.policy);

        // 预计算键,避免 sort_by 中重复查 BOM
        let mut keyed: Vec<(SortKey, Order)> = orders
            .into_iter()
            .map(|o| (self.build_key(&o, bom, now), o))
            .collect();

        // sort_by 为稳定排序,键相同保持输入顺序
        keyed.sort_by(|(ka, _), (kb, _)| cmp(ka, kb));
        keyed.into_iter().map(|(_, o)| o).collect()
    }

    /// 带外部重排提示的排序
    ///
    /// 提示中的订单按提示顺序置前; 其余订单按策略排序后追加。
    /// 提示中不存在的ID被忽略; 同ID的多张订单一并置前 (保持输入顺序)。
    pub fn sequence_with_hint(
        &self,
        orders: Vec<Order>,
        hint: &[String],
        bom: &BillOfMaterials,
        now: NaiveDateTime,
    ) -> Vec<Order> {
        if hint.is_empty() {
            return self.sequence(orders, bom, now);
        }

        // 按下标记账,重复ID的订单各自保留
        let mut slots: Vec<Option<Order>> = orders.into_iter().map(Some).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut head: Vec<Order> = Vec::new();
        for id in hint {
            if !seen.insert(id.as_str()) {
                continue;
            }
            for slot in slots.iter_mut() {
                if slot.as_ref().is_some_and(|o| o.order_id == *id) {
                    head.extend(slot.take());
                }
            }
        }

        let rest: Vec<Order> = slots.into_iter().flatten().collect();

        tracing::debug!(
            hinted = head.len(),
            remaining = rest.len(),
            policy = %self.policy,
            "应用外部重排提示"
        );

        head.extend(self.sequence(rest, bom, now));
        head
    }
}
