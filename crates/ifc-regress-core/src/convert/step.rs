//! Bundled converter for `.ifc` STEP files.

use super::scanner::{self, IndexEntry, InstanceScanner, Scanned, StepHeader};
use super::{dotted_extension, Converter, GeometrySummary, ModelHandle, OpenOptions};
use crate::errors::ConvertError;
use crate::model::ModelFacts;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, warn};

pub const STEP_EXTENSION: &str = ".ifc";

const APPLICATION_UNKNOWN: &str = "Unknown";

/// Concrete IfcProduct subtypes across IFC2X3 and IFC4.
const PRODUCT_TYPES: &[&str] = &[
    "IFCACTUATOR",
    "IFCAIRTERMINAL",
    "IFCAIRTERMINALBOX",
    "IFCAIRTOAIRHEATRECOVERY",
    "IFCALARM",
    "IFCANNOTATION",
    "IFCAUDIOVISUALAPPLIANCE",
    "IFCBEAM",
    "IFCBEAMSTANDARDCASE",
    "IFCBOILER",
    "IFCBUILDING",
    "IFCBUILDINGELEMENTPART",
    "IFCBUILDINGELEMENTPROXY",
    "IFCBUILDINGSTOREY",
    "IFCBURNER",
    "IFCCABLECARRIERFITTING",
    "IFCCABLECARRIERSEGMENT",
    "IFCCABLEFITTING",
    "IFCCABLESEGMENT",
    "IFCCHILLER",
    "IFCCHIMNEY",
    "IFCCOIL",
    "IFCCOLUMN",
    "IFCCOLUMNSTANDARDCASE",
    "IFCCOMPRESSOR",
    "IFCCONDENSER",
    "IFCCONTROLLER",
    "IFCCOOLEDBEAM",
    "IFCCOOLINGTOWER",
    "IFCCOVERING",
    "IFCCURTAINWALL",
    "IFCDAMPER",
    "IFCDISCRETEACCESSORY",
    "IFCDISTRIBUTIONCHAMBERELEMENT",
    "IFCDISTRIBUTIONCONTROLELEMENT",
    "IFCDISTRIBUTIONELEMENT",
    "IFCDISTRIBUTIONFLOWELEMENT",
    "IFCDISTRIBUTIONPORT",
    "IFCDOOR",
    "IFCDOORSTANDARDCASE",
    "IFCDUCTFITTING",
    "IFCDUCTSEGMENT",
    "IFCDUCTSILENCER",
    "IFCELECTRICAPPLIANCE",
    "IFCELECTRICDISTRIBUTIONBOARD",
    "IFCELECTRICDISTRIBUTIONPOINT",
    "IFCELECTRICFLOWSTORAGEDEVICE",
    "IFCELECTRICGENERATOR",
    "IFCELECTRICMOTOR",
    "IFCELECTRICTIMECONTROL",
    "IFCELEMENTASSEMBLY",
    "IFCENERGYCONVERSIONDEVICE",
    "IFCENGINE",
    "IFCEVAPORATIVECOOLER",
    "IFCEVAPORATOR",
    "IFCEXTERNALSPATIALELEMENT",
    "IFCFAN",
    "IFCFASTENER",
    "IFCFILTER",
    "IFCFIRESUPPRESSIONTERMINAL",
    "IFCFLOWCONTROLLER",
    "IFCFLOWFITTING",
    "IFCFLOWINSTRUMENT",
    "IFCFLOWMETER",
    "IFCFLOWMOVINGDEVICE",
    "IFCFLOWSEGMENT",
    "IFCFLOWSTORAGEDEVICE",
    "IFCFLOWTERMINAL",
    "IFCFLOWTREATMENTDEVICE",
    "IFCFOOTING",
    "IFCFURNISHINGELEMENT",
    "IFCFURNITURE",
    "IFCGEOGRAPHICELEMENT",
    "IFCGRID",
    "IFCHEATEXCHANGER",
    "IFCHUMIDIFIER",
    "IFCINTERCEPTOR",
    "IFCJUNCTIONBOX",
    "IFCLAMP",
    "IFCLIGHTFIXTURE",
    "IFCMECHANICALFASTENER",
    "IFCMEDICALDEVICE",
    "IFCMEMBER",
    "IFCMEMBERSTANDARDCASE",
    "IFCMOTORCONNECTION",
    "IFCOPENINGELEMENT",
    "IFCOPENINGSTANDARDCASE",
    "IFCOUTLET",
    "IFCPILE",
    "IFCPIPEFITTING",
    "IFCPIPESEGMENT",
    "IFCPLATE",
    "IFCPLATESTANDARDCASE",
    "IFCPROJECTIONELEMENT",
    "IFCPROTECTIVEDEVICE",
    "IFCPROTECTIVEDEVICETRIPPINGUNIT",
    "IFCPROXY",
    "IFCPUMP",
    "IFCRAILING",
    "IFCRAMP",
    "IFCRAMPFLIGHT",
    "IFCREINFORCINGBAR",
    "IFCREINFORCINGMESH",
    "IFCROOF",
    "IFCSANITARYTERMINAL",
    "IFCSENSOR",
    "IFCSHADINGDEVICE",
    "IFCSITE",
    "IFCSLAB",
    "IFCSLABELEMENTEDCASE",
    "IFCSLABSTANDARDCASE",
    "IFCSOLARDEVICE",
    "IFCSPACE",
    "IFCSPACEHEATER",
    "IFCSTACKTERMINAL",
    "IFCSTAIR",
    "IFCSTAIRFLIGHT",
    "IFCSTRUCTURALCURVEACTION",
    "IFCSTRUCTURALCURVECONNECTION",
    "IFCSTRUCTURALCURVEMEMBER",
    "IFCSTRUCTURALPOINTACTION",
    "IFCSTRUCTURALPOINTCONNECTION",
    "IFCSTRUCTURALPOINTREACTION",
    "IFCSTRUCTURALSURFACEACTION",
    "IFCSTRUCTURALSURFACECONNECTION",
    "IFCSTRUCTURALSURFACEMEMBER",
    "IFCSWITCHINGDEVICE",
    "IFCSYSTEMFURNITUREELEMENT",
    "IFCTANK",
    "IFCTENDON",
    "IFCTENDONANCHOR",
    "IFCTRANSFORMER",
    "IFCTRANSPORTELEMENT",
    "IFCTUBEBUNDLE",
    "IFCUNITARYCONTROLELEMENT",
    "IFCUNITARYEQUIPMENT",
    "IFCVALVE",
    "IFCVIBRATIONISOLATOR",
    "IFCVIRTUALELEMENT",
    "IFCWALL",
    "IFCWALLELEMENTEDCASE",
    "IFCWALLSTANDARDCASE",
    "IFCWASTETERMINAL",
    "IFCWINDOW",
    "IFCWINDOWSTANDARDCASE",
];

/// Concrete IfcSolidModel subtypes.
const SOLID_TYPES: &[&str] = &[
    "IFCADVANCEDBREP",
    "IFCADVANCEDBREPWITHVOIDS",
    "IFCCSGSOLID",
    "IFCEXTRUDEDAREASOLID",
    "IFCEXTRUDEDAREASOLIDTAPERED",
    "IFCFACETEDBREP",
    "IFCFACETEDBREPWITHVOIDS",
    "IFCFIXEDREFERENCESWEPTAREASOLID",
    "IFCREVOLVEDAREASOLID",
    "IFCREVOLVEDAREASOLIDTAPERED",
    "IFCSURFACECURVESWEPTAREASOLID",
    "IFCSWEPTDISKSOLID",
    "IFCSWEPTDISKSOLIDPOLYGONAL",
];

const MAPPED_TYPES: &[&str] = &["IFCMAPPEDITEM"];

const BOOLEAN_TYPES: &[&str] = &["IFCBOOLEANRESULT", "IFCBOOLEANCLIPPINGRESULT"];

const OWNER_HISTORY: &str = "IFCOWNERHISTORY";
const APPLICATION: &str = "IFCAPPLICATION";
const SHAPE_REPRESENTATION: &str = "IFCSHAPEREPRESENTATION";

#[derive(Debug, Clone, Copy, Default)]
pub struct StepConverter;

impl Converter for StepConverter {
    fn name(&self) -> &str {
        "step"
    }

    fn open(
        &self,
        source: &Path,
        options: &OpenOptions,
    ) -> Result<Box<dyn ModelHandle>, ConvertError> {
        let model = StepModel::load(source)?;
        if options.caching {
            model.write_cache(&options.converted_path)?;
        }
        Ok(Box::new(model))
    }
}

#[derive(Debug, Clone)]
struct StoredInstance {
    type_name: String,
    args: String,
}

/// A scanned STEP model. Type names are stored upper-cased.
#[derive(Debug)]
pub struct StepModel {
    header: StepHeader,
    instances: FxHashMap<u64, StoredInstance>,
    type_counts: FxHashMap<String, u64>,
    index: Vec<IndexEntry>,
    first_owner_history: Option<u64>,
    geometry_nodes: u64,
}

#[derive(Serialize)]
struct CacheFile<'a> {
    schema: Option<&'a str>,
    entity_count: usize,
    instances: &'a [IndexEntry],
}

impl StepModel {
    pub fn load(source: &Path) -> Result<Self, ConvertError> {
        let extension = dotted_extension(source);
        if extension != STEP_EXTENSION {
            return Err(ConvertError::UnsupportedFormat { extension });
        }
        let bytes = std::fs::read(source).map_err(|e| ConvertError::io(source, e))?;
        let content = String::from_utf8_lossy(&bytes);
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConvertError> {
        if !content.trim_start().starts_with("ISO-10303-21") {
            warn!("missing ISO-10303-21 signature");
        }
        let header = scanner::parse_header(content);
        let scan = InstanceScanner::new(content)
            .ok_or_else(|| ConvertError::Malformed("no DATA section".into()))?;

        let mut model = StepModel {
            header,
            instances: FxHashMap::default(),
            type_counts: FxHashMap::default(),
            index: Vec::new(),
            first_owner_history: None,
            geometry_nodes: 0,
        };
        let mut unreadable = 0usize;
        for item in scan {
            match item {
                Scanned::Instance(i) => {
                    let type_name = i.type_name.to_ascii_uppercase();
                    if model.instances.contains_key(&i.id) {
                        warn!(id = i.id, "duplicate instance #{}; keeping the first", i.id);
                        continue;
                    }
                    if type_name == OWNER_HISTORY && model.first_owner_history.is_none() {
                        model.first_owner_history = Some(i.id);
                    }
                    *model.type_counts.entry(type_name.clone()).or_insert(0) += 1;
                    model.index.push(IndexEntry {
                        id: i.id,
                        start: i.offset,
                        len: i.end - i.offset,
                    });
                    model.instances.insert(
                        i.id,
                        StoredInstance {
                            type_name,
                            args: i.args.to_string(),
                        },
                    );
                }
                Scanned::Unreadable { offset, reason } => {
                    unreadable += 1;
                    warn!(line = line_of(content, offset), "{reason}");
                }
            }
        }
        debug!(
            entities = model.instances.len(),
            types = model.type_counts.len(),
            unreadable,
            "scanned model"
        );
        Ok(model)
    }

    pub fn entity_count(&self) -> u64 {
        self.instances.len() as u64
    }

    fn count_of(&self, types: &[&str]) -> u64 {
        types
            .iter()
            .filter_map(|t| self.type_counts.get(*t))
            .sum()
    }

    fn attributes(&self, id: u64, expected_type: &str) -> Option<Vec<&str>> {
        let inst = self.instances.get(&id)?;
        if inst.type_name != expected_type {
            return None;
        }
        Some(scanner::split_attributes(&inst.args))
    }

    /// `"<full name> <version>"` of the application owning the first owner
    /// history, or `Unknown`.
    fn application(&self) -> String {
        let Some(history) = self.first_owner_history else {
            return APPLICATION_UNKNOWN.to_string();
        };
        let app = self
            .attributes(history, OWNER_HISTORY)
            .and_then(|attrs| attrs.get(1).map(|a| scanner::references(a)))
            .and_then(|refs| refs.first().copied())
            .and_then(|app_id| self.attributes(app_id, APPLICATION));
        let Some(attrs) = app else {
            warn!(owner_history = history, "owning application cannot be resolved");
            return APPLICATION_UNKNOWN.to_string();
        };
        let version = attrs.get(1).and_then(|a| scanner::string_value(a));
        let full_name = attrs.get(2).and_then(|a| scanner::string_value(a));
        match (full_name, version) {
            (Some(n), Some(v)) => format!("{n} {v}"),
            (Some(n), None) => n,
            (None, Some(v)) => v,
            (None, None) => APPLICATION_UNKNOWN.to_string(),
        }
    }

    fn description(&self) -> Option<String> {
        let first = self.header.descriptions.first();
        let level = self.header.implementation_level.as_ref();
        if first.is_none() && level.is_none() {
            return None;
        }
        Some(format!(
            "{}, {}",
            first.map(String::as_str).unwrap_or_default(),
            level.map(String::as_str).unwrap_or_default()
        ))
    }

    /// Persist the instance index as JSON.
    pub fn write_cache(&self, path: &Path) -> Result<(), ConvertError> {
        let cache = CacheFile {
            schema: self.header.schemas.first().map(String::as_str),
            entity_count: self.instances.len(),
            instances: &self.index,
        };
        let write = || -> std::io::Result<()> {
            let mut w = BufWriter::new(File::create(path)?);
            serde_json::to_writer(&mut w, &cache)?;
            w.flush()
        };
        write().map_err(|e| ConvertError::io(path, e))?;
        debug!(path = %path.display(), "wrote model cache");
        Ok(())
    }
}

impl ModelHandle for StepModel {
    /// One geometry node per resolvable item of every shape representation.
    fn generate_geometry(&mut self) -> Result<GeometrySummary, ConvertError> {
        let mut reps: Vec<u64> = self
            .instances
            .iter()
            .filter(|(_, i)| i.type_name == SHAPE_REPRESENTATION)
            .map(|(id, _)| *id)
            .collect();
        reps.sort_unstable();

        let mut nodes = 0u64;
        let mut unresolved = 0u64;
        for rep in reps {
            let Some(attrs) = self.attributes(rep, SHAPE_REPRESENTATION) else {
                continue;
            };
            let Some(items) = attrs.get(3) else {
                warn!(representation = rep, "shape representation #{rep} has no items");
                continue;
            };
            for item in scanner::references(items) {
                if self.instances.contains_key(&item) {
                    nodes += 1;
                } else {
                    unresolved += 1;
                    error!(
                        representation = rep,
                        "representation item #{item} of #{rep} does not exist"
                    );
                }
            }
        }

        if nodes == 0 && unresolved > 0 {
            return Err(ConvertError::Geometry(format!(
                "none of {unresolved} representation items could be resolved"
            )));
        }
        self.geometry_nodes = nodes;
        debug!(nodes, unresolved, "generated geometry");
        Ok(GeometrySummary { node_count: nodes })
    }

    fn facts(&self) -> Result<ModelFacts, ConvertError> {
        Ok(ModelFacts {
            entity_count: self.entity_count(),
            geometry_node_count: self.geometry_nodes,
            product_count: self.count_of(PRODUCT_TYPES),
            solid_count: self.count_of(SOLID_TYPES),
            mapped_count: self.count_of(MAPPED_TYPES),
            boolean_count: self.count_of(BOOLEAN_TYPES),
            schema: self.header.schemas.first().cloned(),
            name: self.header.name.clone(),
            description: self.description(),
            application: Some(self.application()),
        })
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    let upto = content.as_bytes().get(..offset).unwrap_or(content.as_bytes());
    memchr::memchr_iter(b'\n', upto).count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALL_MODEL: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('wall.ifc','2024-01-01T00:00:00',('Author'),('Org'),'pre','App','');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPERSON($,'Doe','Jane',$,$,$,$,$);
#2=IFCORGANIZATION($,'Acme',$,$,$);
#3=IFCPERSONANDORGANIZATION(#1,#2,$);
#4=IFCAPPLICATION(#2,'2024.1','Acme Modeller','AM');
#5=IFCOWNERHISTORY(#3,#4,$,.ADDED.,$,$,$,1700000000);
#10=IFCWALL('0abc',#5,'Wall',$,$,$,#20,$,$);
#11=IFCSLAB('0def',#5,'Slab',$,$,$,$,$,$);
#12=IFCEXTRUDEDAREASOLID(#30,$,#31,3000.);
#13=IFCMAPPEDITEM(#40,#41);
#14=IFCBOOLEANCLIPPINGRESULT(.DIFFERENCE.,#12,#42);
#20=IFCPRODUCTDEFINITIONSHAPE($,$,(#21));
#21=IFCSHAPEREPRESENTATION(#50,'Body','SweptSolid',(#12,#13));
ENDSEC;
END-ISO-10303-21;
"#;

    #[test]
    fn facts_from_header_and_counts() {
        let model = StepModel::parse(WALL_MODEL).unwrap();
        let f = model.facts().unwrap();
        assert_eq!(f.entity_count, 12);
        assert_eq!(f.product_count, 2);
        assert_eq!(f.solid_count, 1);
        assert_eq!(f.mapped_count, 1);
        assert_eq!(f.boolean_count, 1);
        assert_eq!(f.schema.as_deref(), Some("IFC4"));
        assert_eq!(f.name.as_deref(), Some("wall.ifc"));
        assert_eq!(
            f.description.as_deref(),
            Some("ViewDefinition [CoordinationView], 2;1")
        );
        assert_eq!(f.application.as_deref(), Some("Acme Modeller 2024.1"));
        assert_eq!(f.geometry_node_count, 0);
    }

    #[test]
    fn geometry_counts_resolvable_items() {
        let mut model = StepModel::parse(WALL_MODEL).unwrap();
        let g = model.generate_geometry().unwrap();
        assert_eq!(g.node_count, 2);
        assert_eq!(model.facts().unwrap().geometry_node_count, 2);
    }

    #[test]
    fn geometry_fails_when_nothing_resolves() {
        let content = "ISO-10303-21;\nDATA;\n#1=IFCSHAPEREPRESENTATION(#9,'Body','Brep',(#7,#8));\nENDSEC;";
        let mut model = StepModel::parse(content).unwrap();
        assert!(matches!(
            model.generate_geometry(),
            Err(ConvertError::Geometry(_))
        ));
    }

    #[test]
    fn missing_owner_history_is_unknown_application() {
        let content = "ISO-10303-21;\nDATA;\n#1=IFCWALL('g',$,$,$,$,$,$,$);\nENDSEC;";
        let f = StepModel::parse(content).unwrap().facts().unwrap();
        assert_eq!(f.application.as_deref(), Some("Unknown"));
        assert_eq!(f.description, None);
        assert_eq!(f.product_count, 1);
    }

    #[test]
    fn no_data_section_is_malformed() {
        let err = StepModel::parse("ISO-10303-21;\nHEADER;\nENDSEC;\n").unwrap_err();
        assert!(matches!(err, ConvertError::Malformed(_)));
    }

    #[test]
    fn rejects_unsupported_containers() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.ifczip", "b.ifcXML", "c.txt"] {
            let p = dir.path().join(name);
            std::fs::write(&p, "x").unwrap();
            assert!(matches!(
                StepModel::load(&p),
                Err(ConvertError::UnsupportedFormat { .. })
            ));
        }
    }

    #[test]
    fn caching_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wall.IFC");
        std::fs::write(&source, WALL_MODEL).unwrap();
        let opts = OpenOptions {
            caching: true,
            converted_path: dir.path().join("wall.IFC.xbim"),
        };
        StepConverter.open(&source, &opts).unwrap();
        let text = std::fs::read_to_string(&opts.converted_path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["entity_count"], 12);
        assert_eq!(v["instances"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn line_numbers_are_one_based() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 4), 3);
    }
}
