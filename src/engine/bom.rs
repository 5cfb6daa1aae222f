// ==========================================
// 单线生产排程引擎 - 物料清单 (BOM)
// ==========================================
// 职责: 产品代码 → 有序 (工序, 单件分钟) 列表
// 规则:
// - 单件分钟为 0 的工序对该产品不存在 (如部分产品无涂覆)
// - 未知产品是错误,不是零工时
// ==========================================

use crate::domain::types::PhaseName;
use crate::engine::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

// ==========================================
// PhaseSpec - 单道工序定义
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub phase: PhaseName,
    pub minutes_per_unit: u32,
}

/// CSV 行: product_code,phase,minutes_per_unit
#[derive(Debug, Deserialize)]
struct BomCsvRow {
    product_code: String,
    phase: String,
    minutes_per_unit: u32,
}

// ==========================================
// BillOfMaterials - 物料清单
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOfMaterials {
    products: BTreeMap<String, Vec<PhaseSpec>>,
}

impl BillOfMaterials {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记产品工艺路线
    ///
    /// 零工时工序被剔除; 结果按固定工艺顺序排列; 同名工序以后者为准。
    pub fn insert(&mut self, product_code: impl Into<String>, routing: &[(PhaseName, u32)]) {
        let mut by_phase: BTreeMap<PhaseName, u32> = BTreeMap::new();
        for (phase, minutes) in routing {
            by_phase.insert(*phase, *minutes);
        }

        let specs: Vec<PhaseSpec> = by_phase
            .into_iter()
            .filter(|(_, minutes)| *minutes > 0)
            .map(|(phase, minutes_per_unit)| PhaseSpec {
                phase,
                minutes_per_unit,
            })
            .collect();

        self.products.insert(product_code.into(), specs);
    }

    /// 演示工厂 (NovaBoard) 的标准 BOM
    pub fn novaboard_catalog() -> Self {
        use PhaseName::*;

        let mut bom = Self::new();
        bom.insert(
            "PCB-IND-100",
            &[(Smt, 30), (Reflow, 15), (Tht, 45), (Aoi, 12), (Test, 30), (Coating, 9), (Pack, 6)],
        );
        bom.insert(
            "MED-300",
            &[(Smt, 45), (Reflow, 30), (Tht, 60), (Aoi, 30), (Test, 90), (Coating, 15), (Pack, 9)],
        );
        bom.insert(
            "IOT-200",
            &[(Smt, 18), (Reflow, 12), (Tht, 0), (Aoi, 9), (Test, 18), (Coating, 0), (Pack, 6)],
        );
        bom.insert(
            "AGR-400",
            &[(Smt, 30), (Reflow, 15), (Tht, 30), (Aoi, 12), (Test, 45), (Coating, 12), (Pack, 0)],
        );
        bom.insert(
            "PCB-PWR-500",
            &[(Smt, 24), (Reflow, 12), (Tht, 0), (Aoi, 9), (Test, 24), (Coating, 0), (Pack, 6)],
        );
        bom
    }

    /// 从 CSV 读取 (表头: product_code,phase,minutes_per_unit)
    pub fn from_csv_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut routings: BTreeMap<String, Vec<(PhaseName, u32)>> = BTreeMap::new();
        for row in csv_reader.deserialize::<BomCsvRow>() {
            let row = row?;
            let phase: PhaseName = row.phase.parse()?;
            routings
                .entry(row.product_code)
                .or_default()
                .push((phase, row.minutes_per_unit));
        }

        let mut bom = Self::new();
        for (code, routing) in routings {
            bom.insert(code, &routing);
        }
        Ok(bom)
    }

    pub fn contains(&self, product_code: &str) -> bool {
        self.products.contains_key(product_code)
    }

    pub fn product_codes(&self) -> impl Iterator<Item = &str> {
        self.products.keys().map(|k| k.as_str())
    }

    /// 产品的有序工序列表
    pub fn phases(&self, product_code: &str) -> EngineResult<&[PhaseSpec]> {
        let specs = self
            .products
            .get(product_code)
            .ok_or_else(|| EngineError::UnknownProduct(product_code.to_string()))?;
        if specs.is_empty() {
            return Err(EngineError::EmptyRouting(product_code.to_string()));
        }
        Ok(specs)
    }

    /// 单件总分钟 = Σ minutes_per_unit
    pub fn minutes_per_unit(&self, product_code: &str) -> EngineResult<u64> {
        Ok(self
            .phases(product_code)?
            .iter()
            .map(|s| u64::from(s.minutes_per_unit))
            .sum())
    }

    /// 总工时 = qty × Σ minutes_per_unit
    pub fn total_minutes(&self, product_code: &str, quantity: u32) -> EngineResult<u64> {
        Ok(self.minutes_per_unit(product_code)? * u64::from(quantity))
    }
}
