//! Tag catalog offered to the shell for selection
//!
//! A catalog is built either from a tag-addressed controller's own tag list
//! or from the data files found by discovery. Entries are grouped the way
//! the selection tree shows them:
//!
//! - Tag-addressed: controller-scope tags, then one group per `Program:`
//! - File-addressed: one group per data file, with the synthesized element,
//!   bit and sub-element tags

use crate::backend::address::{FileAddress, FileType, WORD_BITS};
use crate::backend::device::TagInfo;
use crate::backend::discovery::DataFile;
use crate::error::{Result, TrendError};
use crate::types::{Tag, TagDataType};
use std::collections::BTreeMap;

/// Atomic device types that can be plotted
pub const TRENDABLE_TYPES: [&str; 14] = [
    "BOOL", "SINT", "INT", "DINT", "LINT", "USINT", "UINT", "UDINT", "REAL", "LREAL", "BYTE",
    "WORD", "DWORD", "LWORD",
];

/// Name fragments of controller-internal tags
const INTERNAL_MARKERS: [&str; 4] = ["__", "Routine:", "Map:", "Task:"];

/// Name of the group holding controller-scope tags
pub const CONTROLLER_GROUP: &str = "Controller Tags";

/// A selectable tag
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// The tag as it would be selected
    pub tag: Tag,
    /// Device type name shown next to the tag
    pub type_name: String,
    /// Whether the tag can be plotted
    pub trendable: bool,
}

/// A titled group of catalog entries
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogGroup {
    /// Group title
    pub name: String,
    /// Entries sorted for display
    pub entries: Vec<CatalogEntry>,
}

/// Everything the device offers for trending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagCatalog {
    groups: Vec<CatalogGroup>,
}

/// Whether a tag list entry is controller-internal
pub fn is_internal_tag(name: &str) -> bool {
    INTERNAL_MARKERS.iter().any(|m| name.contains(m))
}

fn data_type_for(type_name: &str) -> TagDataType {
    match type_name {
        "BOOL" => TagDataType::Bool,
        "REAL" | "LREAL" => TagDataType::Float,
        t if TRENDABLE_TYPES.contains(&t) => TagDataType::Integer,
        _ => TagDataType::Text,
    }
}

fn sort_entries(entries: &mut [CatalogEntry]) {
    entries.sort_by_cached_key(|e| e.tag.name.to_lowercase());
}

impl TagCatalog {
    /// Build the catalog of a tag-addressed controller
    pub fn from_tag_list(tags: Vec<TagInfo>) -> Self {
        let mut controller = Vec::new();
        let mut programs: BTreeMap<String, Vec<CatalogEntry>> = BTreeMap::new();
        let mut skipped = 0usize;

        for info in tags {
            if is_internal_tag(&info.name) {
                skipped += 1;
                continue;
            }
            let type_name = if info.type_name.is_empty() {
                "UNKNOWN".to_string()
            } else {
                info.type_name
            };
            let entry = CatalogEntry {
                trendable: TRENDABLE_TYPES.contains(&type_name.as_str()),
                tag: Tag::named(info.name.clone(), data_type_for(&type_name)),
                type_name,
            };

            if info.name.starts_with("Program:") {
                let program = match info.name.find('.') {
                    Some(dot) if dot > 0 => &info.name[..dot],
                    _ => info.name.as_str(),
                };
                programs.entry(program.to_string()).or_default().push(entry);
            } else {
                controller.push(entry);
            }
        }
        tracing::debug!("Skipped {} internal tags", skipped);

        let mut groups = Vec::with_capacity(programs.len() + 1);
        sort_entries(&mut controller);
        groups.push(CatalogGroup {
            name: CONTROLLER_GROUP.to_string(),
            entries: controller,
        });
        let mut programs: Vec<_> = programs.into_iter().collect();
        programs.sort_by_cached_key(|(name, _)| name.to_lowercase());
        for (name, mut entries) in programs {
            sort_entries(&mut entries);
            groups.push(CatalogGroup { name, entries });
        }

        Self { groups }
    }

    /// Build the catalog of a file-addressed controller
    pub fn from_data_files(files: &[DataFile]) -> Self {
        let groups = files
            .iter()
            .filter(|f| f.exists)
            .map(|file| CatalogGroup {
                name: format!("{} - {}", file.label(), file.file_type),
                entries: synthesize_tags(file),
            })
            .collect();
        Self { groups }
    }

    /// Groups in display order
    pub fn groups(&self) -> &[CatalogGroup] {
        &self.groups
    }

    /// Every entry, in display order
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.groups.iter().flat_map(|g| g.entries.iter())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entry by tag name
    pub fn find(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries().find(|e| e.tag.name == name)
    }

    /// Entries whose name or type contains `query` (case-insensitive)
    pub fn filter(&self, query: &str) -> Vec<&CatalogEntry> {
        let query = query.to_lowercase();
        self.entries()
            .filter(|e| {
                query.is_empty()
                    || e.tag.name.to_lowercase().contains(&query)
                    || e.type_name.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Resolve names to trendable tags, in the given order
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Tag>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                match self.find(name) {
                    Some(entry) if entry.trendable => Ok(entry.tag.clone()),
                    Some(_) => Err(TrendError::InvalidConfiguration(format!(
                        "tag '{}' cannot be trended",
                        name
                    ))),
                    None => Err(TrendError::InvalidConfiguration(format!(
                        "tag '{}' is not in the catalog",
                        name
                    ))),
                }
            })
            .collect()
    }
}

/// Expand a data file into its selectable tags
pub fn synthesize_tags(file: &DataFile) -> Vec<CatalogEntry> {
    let elements = file.element_count.unwrap_or(1);
    let mut entries = Vec::new();

    for element in 0..elements {
        let address = FileAddress::new(file.file_type, file.file_number, element);
        match file.file_type {
            FileType::Integer
            | FileType::Binary
            | FileType::Output
            | FileType::Input
            | FileType::Status => {
                entries.push(entry(Tag::element(address, TagDataType::Integer)));
                for bit in 0..WORD_BITS {
                    entries.push(entry(Tag::bit(address, bit)));
                }
            }
            FileType::Timer | FileType::Counter | FileType::Control => {
                for sub in file.file_type.sub_elements() {
                    let member = address.with_sub(*sub);
                    entries.push(entry(Tag::element(member, member.data_type())));
                }
            }
            FileType::Float | FileType::Long => {
                entries.push(entry(Tag::element(address, address.data_type())));
            }
            FileType::String | FileType::Ascii => {
                entries.push(entry(Tag::element(address, TagDataType::Text)));
            }
        }
    }
    entries
}

fn entry(tag: Tag) -> CatalogEntry {
    CatalogEntry {
        type_name: tag.data_type.to_string(),
        trendable: tag.data_type.is_trendable(),
        tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::address::SubElement;
    use crate::types::TagAddress;

    fn file(file_number: u8, file_type: FileType, count: Option<u16>) -> DataFile {
        DataFile {
            file_number,
            file_type,
            element_count: count,
            exists: true,
        }
    }

    #[test]
    fn test_integer_file_synthesis() {
        let entries = synthesize_tags(&file(7, FileType::Integer, Some(2)));
        assert_eq!(entries.len(), 2 * 17);
        assert_eq!(entries[0].tag.name, "N7:0");
        assert_eq!(entries[1].tag.name, "N7:0/0");
        assert_eq!(entries[16].tag.name, "N7:0/15");
        assert_eq!(entries[17].tag.name, "N7:1");
        assert!(entries.iter().all(|e| e.trendable));
    }

    #[test]
    fn test_structured_file_synthesis() {
        let timers = synthesize_tags(&file(4, FileType::Timer, Some(1)));
        let names: Vec<_> = timers.iter().map(|e| e.tag.name.as_str()).collect();
        assert_eq!(names, ["T4:0.PRE", "T4:0.ACC", "T4:0.EN", "T4:0.TT", "T4:0.DN"]);

        let counters = synthesize_tags(&file(5, FileType::Counter, Some(2)));
        assert_eq!(counters.len(), 14);
        let control = synthesize_tags(&file(6, FileType::Control, Some(1)));
        assert_eq!(control.len(), 10);
        assert_eq!(
            control[0].tag.address,
            TagAddress::FileElement(
                FileAddress::new(FileType::Control, 6, 0).with_sub(SubElement::Len)
            )
        );
    }

    #[test]
    fn test_float_string_and_unknown_size() {
        let floats = synthesize_tags(&file(8, FileType::Float, None));
        assert_eq!(floats.len(), 1);
        assert_eq!(floats[0].tag.data_type, TagDataType::Float);

        let strings = synthesize_tags(&file(10, FileType::String, Some(3)));
        assert_eq!(strings.len(), 3);
        assert!(strings.iter().all(|e| !e.trendable));
    }

    #[test]
    fn test_tag_list_filtering_and_grouping() {
        let catalog = TagCatalog::from_tag_list(vec![
            TagInfo::new("zeta", "DINT"),
            TagInfo::new("Alpha", "REAL"),
            TagInfo::new("__internal", "DINT"),
            TagInfo::new("Map:Local", "DINT"),
            TagInfo::new("Program:Main.Speed", "REAL"),
            TagInfo::new("Program:Main.count", "INT"),
            TagInfo::new("Program:Aux.Recipe", "RECIPE_UDT"),
            TagInfo::new("Message", "STRING"),
        ]);

        let groups = catalog.groups();
        assert_eq!(groups[0].name, CONTROLLER_GROUP);
        let controller: Vec<_> = groups[0].entries.iter().map(|e| e.tag.name.as_str()).collect();
        assert_eq!(controller, ["Alpha", "Message", "zeta"]);
        assert_eq!(groups[1].name, "Program:Aux");
        assert_eq!(groups[2].name, "Program:Main");
        let main: Vec<_> = groups[2].entries.iter().map(|e| e.tag.name.as_str()).collect();
        assert_eq!(main, ["Program:Main.count", "Program:Main.Speed"]);

        assert!(!catalog.find("Message").unwrap().trendable);
        assert!(!catalog.find("Program:Aux.Recipe").unwrap().trendable);
        assert!(catalog.find("__internal").is_none());
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_filter_and_resolve() {
        let catalog = TagCatalog::from_tag_list(vec![
            TagInfo::new("Motor_Speed", "REAL"),
            TagInfo::new("Motor_Run", "BOOL"),
            TagInfo::new("Label", "STRING"),
        ]);
        assert_eq!(catalog.filter("motor").len(), 2);
        assert_eq!(catalog.filter("bool").len(), 1);
        assert_eq!(catalog.filter("").len(), 3);

        let tags = catalog.resolve(&["Motor_Run", "Motor_Speed"]).unwrap();
        assert_eq!(tags[0].data_type, TagDataType::Bool);
        assert!(catalog.resolve(&["Label"]).is_err());
        assert!(catalog.resolve(&["Nope"]).is_err());
    }

    #[test]
    fn test_from_data_files_groups() {
        let catalog = TagCatalog::from_data_files(&[
            file(7, FileType::Integer, Some(1)),
            file(8, FileType::Float, Some(4)),
        ]);
        assert_eq!(catalog.groups().len(), 2);
        assert_eq!(catalog.groups()[0].name, "N7 - Integer");
        assert_eq!(catalog.len(), 17 + 4);
        assert!(catalog.find("F8:3").is_some());
    }
}
