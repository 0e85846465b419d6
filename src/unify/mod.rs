//! The unification pipeline: engine output in, unified table out.

pub mod enrich;
pub mod ident;
pub mod quant;
pub mod sanitize;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::chem::NaturalAbundancePattern;
use crate::engines::{self, EngineFormat, ExtractorError, RawRecord};
use crate::meta::{MetaError, RtLookup};
use crate::mods::{BuiltinUnimod, ModificationLookup};
use crate::params::{ParamsError, UnifyParams};
use crate::proteins::{FastaMapper, ProteinError};
use crate::schema::{table::TableError, Table};

/// Pipeline failures.
#[derive(Debug, Error)]
pub enum UnifyError {
    #[error(transparent)]
    Extract(#[from] ExtractorError),
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Proteins(#[from] ProteinError),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not detect the engine format of '{0}'")]
    UnknownFormat(PathBuf),
}

/// One peptide-spectrum match flowing through the identification pipeline.
/// `None` marks fields not yet derived; they become sentinels in the final
/// table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsmRow {
    pub spectrum_id: Option<i64>,
    pub spectrum_title: Option<String>,
    pub raw_data_location: Option<String>,
    pub sequence: String,
    pub modifications: String,
    pub charge: Option<i64>,
    pub protein_id: Option<String>,
    pub retention_time_seconds: Option<f64>,
    pub exp_mz: Option<f64>,
    pub calc_mz: Option<f64>,
    pub ucalc_mz: Option<f64>,
    pub ucalc_mass: Option<f64>,
    pub accuracy_ppm: Option<f64>,
    pub accuracy_ppm_c12: Option<f64>,
    pub chemical_composition: Option<String>,
    pub sequence_start: Option<String>,
    pub sequence_stop: Option<String>,
    pub sequence_pre_aa: Option<String>,
    pub sequence_post_aa: Option<String>,
    pub enzn: bool,
    pub enzc: bool,
    pub missed_cleavages: Option<i64>,
    pub rank: Option<i64>,
    pub is_decoy: bool,
    pub is_immutable: bool,
    pub search_engine: String,
    /// Namespaced engine columns, engine-native values.
    pub extras: BTreeMap<String, String>,
}

impl PsmRow {
    /// Lifts a flat extractor record into a typed row. Unknown keys land in
    /// `extras`.
    pub fn from_record(record: RawRecord, engine: &str) -> PsmRow {
        let mut row = PsmRow {
            search_engine: engine.to_string(),
            ..PsmRow::default()
        };
        for (key, value) in record {
            match key.as_str() {
                "spectrum_id" => row.spectrum_id = value.parse().ok(),
                "spectrum_title" => row.spectrum_title = Some(value),
                "raw_data_location" => row.raw_data_location = Some(value),
                "sequence" => row.sequence = value,
                "modifications" => row.modifications = value,
                "charge" => row.charge = value.parse().ok(),
                "protein_id" => row.protein_id = Some(value),
                "retention_time_seconds" => {
                    row.retention_time_seconds = value.parse().ok()
                }
                "exp_mz" => row.exp_mz = value.parse().ok(),
                "calc_mz" => row.calc_mz = value.parse().ok(),
                _ => {
                    row.extras.insert(key, value);
                }
            }
        }
        row
    }
}

/// Ready-to-run pipeline with all side inputs loaded.
pub struct Unifier {
    params: UnifyParams,
    lookup: ModificationLookup,
    rt: RtLookup,
    mapper: Option<FastaMapper>,
    pattern: NaturalAbundancePattern,
}

impl Unifier {
    /// Resolves modifications and loads the lookup and database named in
    /// the parameters.
    pub fn new(params: UnifyParams) -> Result<Unifier, UnifyError> {
        let lookup = ModificationLookup::resolve(&params.modifications, &BuiltinUnimod);
        let rt = match &params.rt_lookup_path {
            Some(path) => RtLookup::from_path(path)?,
            None => RtLookup::default(),
        };
        let mapper = match &params.database {
            Some(path) => Some(FastaMapper::from_path(path)?),
            None => None,
        };
        Ok(Unifier {
            params,
            lookup,
            rt,
            mapper,
            pattern: NaturalAbundancePattern,
        })
    }

    pub fn params(&self) -> &UnifyParams {
        &self.params
    }

    /// Unifies one result file. `format` overrides detection when given.
    pub fn unify_path(
        &self,
        path: &Path,
        format: Option<EngineFormat>,
    ) -> Result<Table, UnifyError> {
        let format = match format {
            Some(f) => f,
            None => engines::detect_format(path)?
                .ok_or_else(|| UnifyError::UnknownFormat(path.to_path_buf()))?,
        };
        log::info!("unifying {} as {format}", path.display());
        match format {
            EngineFormat::CometMzid => {
                let extraction = engines::comet::extract(path, &self.lookup)?;
                self.unify_ident(extraction, format)
            }
            EngineFormat::MsgfPlusMzid => {
                let extraction = engines::msgfplus::extract(path)?;
                self.unify_ident(extraction, format)
            }
            EngineFormat::XTandemXml => {
                let extraction = engines::xtandem::extract(path, &self.lookup)?;
                self.unify_ident(extraction, format)
            }
            EngineFormat::MsFraggerTsv => {
                let extraction =
                    engines::msfragger::extract(path, &self.lookup, self.params.label_15n)?;
                self.unify_ident(extraction, format)
            }
            EngineFormat::FlashLfqTsv => {
                let extraction = engines::flashlfq::extract(path)?;
                self.unify_quant(extraction)
            }
            EngineFormat::TmtQuantCsv => {
                let extraction = engines::tmtquant::extract(path)?;
                self.unify_quant(extraction)
            }
        }
    }

    fn unify_ident(
        &self,
        extraction: engines::Extraction,
        format: EngineFormat,
    ) -> Result<Table, UnifyError> {
        let ctx = ident::IdentContext {
            params: &self.params,
            lookup: &self.lookup,
            rt: &self.rt,
            mapper: self.mapper.as_ref().map(|m| m as &dyn crate::proteins::PeptideMapper),
            pattern: &self.pattern,
            format,
        };
        Ok(ident::unify_ident(extraction, &ctx)?)
    }

    fn unify_quant(&self, extraction: engines::Extraction) -> Result<Table, UnifyError> {
        let ctx = quant::QuantContext {
            lookup: &self.lookup,
            rt: &self.rt,
        };
        Ok(quant::unify_quant(extraction, &ctx)?)
    }
}
