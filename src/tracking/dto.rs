// ==========================================
// 单线生产排程引擎 - 跟踪服务数据契约
// ==========================================
// 职责: 跟踪服务记录的唯一、带版本的反序列化模式
// 红线:
// - 引擎只接收已转换的领域类型,不接触原始 JSON
// - 工序名称只从 phase.name 读取; 未知名称/状态是格式错误
// ==========================================

use crate::domain::order::Order;
use crate::domain::schedule::{PhasePlan, ProductionEntry};
use crate::domain::types::{PhaseName, PhaseStatus};
use crate::engine::bom::BillOfMaterials;
use crate::tracking::error::{TrackingError, TrackingResult};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 当前支持的数据契约版本
pub const TRACKING_SCHEMA_VERSION: u32 = 1;

/// 线上时间格式 (工厂本地时间,带 Z 后缀)
pub const WIRE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 解析线上时间; 兼容有无 Z 后缀与小数秒
pub fn parse_wire_datetime(raw: &str) -> TrackingResult<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| TrackingError::Schema(format!("无效时间 '{}': {}", raw, e)))
}

pub fn format_wire_datetime(t: NaiveDateTime) -> String {
    t.format(WIRE_DATETIME_FORMAT).to_string()
}

mod wire_datetime {
    use super::{format_wire_datetime, parse_wire_datetime};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_wire_datetime(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_wire_datetime(&raw).map_err(serde::de::Error::custom)
    }
}

mod wire_datetime_opt {
    use super::{format_wire_datetime, parse_wire_datetime};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&format_wire_datetime(*t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_wire_datetime(s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

// ==========================================
// 版本信封
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEnvelope<T> {
    pub schema_version: u32,
    pub data: T,
}

/// 解析带版本信封的载荷
pub fn decode_envelope<T: DeserializeOwned>(raw: &str) -> TrackingResult<T> {
    let envelope: TrackingEnvelope<serde_json::Value> = serde_json::from_str(raw)?;
    if envelope.schema_version != TRACKING_SCHEMA_VERSION {
        return Err(TrackingError::UnsupportedSchemaVersion {
            found: envelope.schema_version,
            expected: TRACKING_SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_value(envelope.data)?)
}

// ==========================================
// 销售订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLineRecord {
    /// 产品代码
    #[serde(rename = "extra_id")]
    pub product_code: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderRecord {
    pub id: String,
    pub internal_id: String,
    #[serde(rename = "customer_attr")]
    pub customer: CustomerRecord,
    pub products: Vec<SalesOrderLineRecord>,
    #[serde(rename = "expected_shipping_time", with = "wire_datetime")]
    pub deadline: NaiveDateTime,
    pub priority: u8,
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

impl SalesOrderRecord {
    /// 转换为领域订单 (单产品行)
    pub fn into_order(self) -> TrackingResult<Order> {
        let line = self.products.into_iter().next().ok_or_else(|| {
            TrackingError::Schema(format!("销售订单 {} 没有产品行", self.id))
        })?;
        Ok(Order {
            order_id: self.id,
            internal_id: self.internal_id,
            product_code: line.product_code,
            quantity: line.quantity,
            deadline: self.deadline,
            priority: self.priority,
            customer: self.customer.name,
            notes: self.notes,
        })
    }
}

// ==========================================
// 生产单与工序
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: String,
    pub phase: PhaseRef,
    pub status: String,
    #[serde(default, with = "wire_datetime_opt")]
    pub starts_at: Option<NaiveDateTime>,
    #[serde(default, with = "wire_datetime_opt")]
    pub ends_at: Option<NaiveDateTime>,
    /// 工时 (分钟)
    #[serde(default)]
    pub duration: u64,
}

impl PhaseRecord {
    pub fn phase_name(&self) -> TrackingResult<PhaseName> {
        self.phase
            .name
            .parse()
            .map_err(|e: crate::engine::error::EngineError| TrackingError::Schema(e.to_string()))
    }

    pub fn phase_status(&self) -> TrackingResult<PhaseStatus> {
        self.status
            .parse()
            .map_err(|e: crate::engine::error::EngineError| TrackingError::Schema(e.to_string()))
    }

    /// 转换为工序计划; 未排日期的工序返回 None
    pub fn into_phase_plan(self) -> TrackingResult<Option<PhasePlan>> {
        let phase = self.phase_name()?;
        let status = self.phase_status()?;
        let (Some(start), Some(end)) = (self.starts_at, self.ends_at) else {
            return Ok(None);
        };
        let duration_minutes = if self.duration > 0 {
            self.duration
        } else {
            u64::try_from((end - start).num_minutes()).unwrap_or(0)
        };
        Ok(Some(PhasePlan {
            phase_id: Some(self.id),
            phase,
            start,
            end,
            duration_minutes,
            status,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderRecord {
    pub id: String,
    /// 批次号 (展示编号)
    #[serde(default)]
    pub lot: Option<String>,
    pub product_internal_id: String,
    pub quantity: u32,
    #[serde(default, with = "wire_datetime_opt")]
    pub starts_at: Option<NaiveDateTime>,
    #[serde(default, with = "wire_datetime_opt")]
    pub ends_at: Option<NaiveDateTime>,
    pub status: String,
    /// 显式销售订单关联 (可缺失)
    #[serde(default)]
    pub sales_order_id: Option<String>,
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
}

impl ProductionOrderRecord {
    pub fn display_id(&self) -> String {
        self.lot
            .clone()
            .unwrap_or_else(|| self.id.chars().take(12).collect())
    }

    /// 转换为在制条目
    ///
    /// 工序按固定工艺顺序排列; 未排日期的工序不参与占线计算。
    /// 没有任何带日期工序时使用生产单自身的起止时间。
    pub fn into_live_entry(self) -> TrackingResult<ProductionEntry> {
        let internal_id = self.display_id();

        let mut phases = Vec::with_capacity(self.phases.len());
        for record in self.phases {
            if let Some(plan) = record.into_phase_plan()? {
                phases.push(plan);
            }
        }
        phases.sort_by_key(|p| p.phase);

        let reported_range = match (self.starts_at, self.ends_at) {
            (Some(start), Some(end)) if phases.is_empty() => Some((start, end)),
            _ => None,
        };

        if phases.is_empty() && reported_range.is_none() {
            return Err(TrackingError::Schema(format!(
                "生产单 {} 没有任何日期信息",
                self.id
            )));
        }

        Ok(ProductionEntry {
            entry_id: Some(self.id),
            internal_id,
            order: None,
            linked_order_id: self.sales_order_id,
            product_code: self.product_internal_id,
            quantity: self.quantity,
            phases,
            is_live: true,
            reported_range,
        })
    }
}

// ==========================================
// BOM 表
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomRecord {
    pub product_code: String,
    pub phase: String,
    pub minutes_per_unit: u32,
}

/// 由跟踪服务 BOM 表构建物料清单
pub fn bom_from_records(records: &[BomRecord]) -> TrackingResult<BillOfMaterials> {
    let mut routings: BTreeMap<&str, Vec<(PhaseName, u32)>> = BTreeMap::new();
    for record in records {
        let phase: PhaseName = record
            .phase
            .parse()
            .map_err(|e: crate::engine::error::EngineError| TrackingError::Schema(e.to_string()))?;
        routings
            .entry(record.product_code.as_str())
            .or_default()
            .push((phase, record.minutes_per_unit));
    }

    let mut bom = BillOfMaterials::new();
    for (code, routing) in routings {
        bom.insert(code, &routing);
    }
    Ok(bom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_sales_order_into_order() {
        let raw = r#"{
            "id": "so-5",
            "internal_id": "SO-0005",
            "customer_attr": {"id": "c-2", "name": "SmartHome"},
            "products": [{"extra_id": "IOT-200", "quantity": 10}],
            "expected_shipping_time": "2026-03-08T16:00:00Z",
            "priority": 1,
            "status": "accepted"
        }"#;
        let record: SalesOrderRecord = serde_json::from_str(raw).unwrap();
        let order = record.into_order().unwrap();
        assert_eq!(order.order_id, "so-5");
        assert_eq!(order.product_code, "IOT-200");
        assert_eq!(order.quantity, 10);
        assert_eq!(order.deadline, at(8, 16, 0));
        assert_eq!(order.customer, "SmartHome");
        assert!(order.notes.is_empty());
    }

    #[test]
    fn test_sales_order_without_lines_is_schema_error() {
        let raw = r#"{
            "id": "so-9", "internal_id": "SO-0009",
            "customer_attr": {"id": "c", "name": "X"},
            "products": [],
            "expected_shipping_time": "2026-03-08T16:00:00",
            "priority": 3, "status": "accepted"
        }"#;
        let record: SalesOrderRecord = serde_json::from_str(raw).unwrap();
        assert!(matches!(record.into_order(), Err(TrackingError::Schema(_))));
    }

    #[test]
    fn test_production_order_into_live_entry_sorts_phases() {
        let raw = r#"{
            "id": "po-1",
            "lot": "LOT-0001",
            "product_internal_id": "IOT-200",
            "quantity": 2,
            "status": "in_progress",
            "sales_order_id": "so-5",
            "phases": [
                {"id": "ph-2", "phase": {"name": "Reflow"}, "status": "ready",
                 "starts_at": "2026-03-02T08:36:00Z", "ends_at": "2026-03-02T09:00:00Z", "duration": 24},
                {"id": "ph-1", "phase": {"name": "SMT"}, "status": "completed",
                 "starts_at": "2026-03-02T08:00:00Z", "ends_at": "2026-03-02T08:36:00Z"},
                {"id": "ph-3", "phase": {"name": "AOI"}, "status": "not_ready"}
            ]
        }"#;
        let record: ProductionOrderRecord = serde_json::from_str(raw).unwrap();
        let entry = record.into_live_entry().unwrap();

        assert_eq!(entry.internal_id, "LOT-0001");
        assert_eq!(entry.linked_order_id.as_deref(), Some("so-5"));
        assert!(entry.is_live);
        assert_eq!(entry.phases.len(), 2);
        assert_eq!(entry.phases[0].phase, PhaseName::Smt);
        assert_eq!(entry.phases[0].status, PhaseStatus::Completed);
        assert_eq!(entry.phases[0].duration_minutes, 36);
        assert_eq!(entry.overall_end(), at(2, 9, 0));
    }

    #[test]
    fn test_production_order_without_phase_dates_uses_reported_range() {
        let record = ProductionOrderRecord {
            id: "po-abcdefghijklmnop".to_string(),
            lot: None,
            product_internal_id: "MED-300".to_string(),
            quantity: 1,
            starts_at: Some(at(2, 8, 0)),
            ends_at: Some(at(2, 12, 39)),
            status: "planned".to_string(),
            sales_order_id: None,
            phases: Vec::new(),
        };
        let entry = record.into_live_entry().unwrap();
        assert_eq!(entry.internal_id, "po-abcdefghi");
        assert_eq!(entry.overall_start(), at(2, 8, 0));
        assert_eq!(entry.overall_end(), at(2, 12, 39));
    }

    #[test]
    fn test_unknown_phase_name_is_schema_error() {
        let record = PhaseRecord {
            id: "ph-1".to_string(),
            phase: PhaseRef { name: "Polish".to_string() },
            status: "ready".to_string(),
            starts_at: None,
            ends_at: None,
            duration: 0,
        };
        assert!(matches!(record.into_phase_plan(), Err(TrackingError::Schema(_))));
    }

    #[test]
    fn test_envelope_version_checked() {
        let ok = r#"{"schema_version": 1, "data": [{"product_code": "X", "phase": "SMT", "minutes_per_unit": 5}]}"#;
        let records: Vec<BomRecord> = decode_envelope(ok).unwrap();
        let bom = bom_from_records(&records).unwrap();
        assert_eq!(bom.total_minutes("X", 3).unwrap(), 15);

        let future = r#"{"schema_version": 2, "data": []}"#;
        let err = decode_envelope::<Vec<BomRecord>>(future).unwrap_err();
        assert_eq!(err, TrackingError::UnsupportedSchemaVersion { found: 2, expected: 1 });
    }

    #[test]
    fn test_wire_datetime_formats() {
        assert_eq!(parse_wire_datetime("2026-03-02T08:00:00Z").unwrap(), at(2, 8, 0));
        assert_eq!(parse_wire_datetime("2026-03-02T08:00:00.000").unwrap(), at(2, 8, 0));
        assert!(parse_wire_datetime("02/03/2026").is_err());
        assert_eq!(format_wire_datetime(at(2, 8, 5)), "2026-03-02T08:05:00Z");
    }
}
