//! Interactive selection over instances, addresses and static options
//!
//! Entries are projected into a display string plus a value string; the
//! pick itself is delegated to a [`Picker`].

use ec2kit_core::{Address, Ec2KitError, Instance, Picker, Result};
use tracing::debug;

/// Minimum width of a padded display column
const MIN_CELL_WIDTH: usize = 18;
/// Padding added after each display column
const CELL_PADDING: usize = 4;

/// Something that can be presented in a picker
pub trait Selectable {
    /// Human-facing line shown in the picker
    fn display(&self) -> String;
    /// Identifier handed back to the action
    fn value(&self) -> &str;
}

/// Projection of an [`Instance`] for listing and picking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceEntry {
    pub instance_id: String,
    pub name: String,
    pub state: String,
    pub instance_type: String,
    pub public_ip: String,
    pub private_ip: String,
    pub ipv6: String,
}

impl InstanceEntry {
    fn cells(&self) -> [&str; 7] {
        [
            &self.instance_id,
            &self.name,
            &self.state,
            &self.instance_type,
            &self.public_ip,
            &self.private_ip,
            &self.ipv6,
        ]
    }

    /// Tab separated line used by `ec2list --tsv`
    pub fn tsv(&self) -> String {
        self.cells().join("\t")
    }
}

impl From<&Instance> for InstanceEntry {
    fn from(instance: &Instance) -> Self {
        Self {
            instance_id: instance.instance_id.clone(),
            name: instance.name().to_string(),
            state: instance.state.to_string(),
            instance_type: instance.instance_type.clone(),
            public_ip: instance.public_ip.clone().unwrap_or_default(),
            private_ip: instance.private_ip.clone().unwrap_or_default(),
            ipv6: instance.ipv6.clone().unwrap_or_default(),
        }
    }
}

impl Selectable for InstanceEntry {
    /// Column-aligned line; every cell but the last is padded
    fn display(&self) -> String {
        let cells = self.cells();
        let (last, padded) = cells.split_last().unwrap_or((&"", &[]));

        let mut line = String::new();
        for cell in padded {
            let width = MIN_CELL_WIDTH.max(cell.chars().count() + CELL_PADDING);
            line.push_str(&format!("{cell:<width$}"));
        }
        line.push_str(last);
        line
    }

    fn value(&self) -> &str {
        &self.instance_id
    }
}

/// Projection of an [`Address`] for picking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry(pub Address);

impl Selectable for AddressEntry {
    fn display(&self) -> String {
        format!("{} {}", self.0.public_ip, self.0.name)
    }

    fn value(&self) -> &str {
        &self.0.allocation_id
    }
}

/// Fixed option such as an instance type or a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticChoice {
    pub label: String,
    pub value: String,
}

impl StaticChoice {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// Option whose label is its value
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(value.clone(), value)
    }
}

impl Selectable for StaticChoice {
    fn display(&self) -> String {
        self.label.clone()
    }

    fn value(&self) -> &str {
        &self.value
    }
}

/// Runs a [`Picker`] over typed entries
pub struct Selector<'a, P: Picker + ?Sized> {
    picker: &'a P,
}

impl<'a, P: Picker + ?Sized> Selector<'a, P> {
    pub fn new(picker: &'a P) -> Self {
        Self { picker }
    }

    /// Present `entries` and return the chosen ones in list order
    ///
    /// Fails with `NothingToSelect` before the picker runs when `entries` is
    /// empty, and with `SelectionCancelled` when the operator picks nothing.
    pub fn choose<T: Selectable>(&self, label: &str, prompt: &str, entries: Vec<T>) -> Result<Vec<T>> {
        if entries.is_empty() {
            return Err(Ec2KitError::NothingToSelect(label.to_string()));
        }

        let lines: Vec<String> = entries.iter().map(Selectable::display).collect();
        let mut picked = self.picker.pick(label, prompt, &lines)?;
        if picked.is_empty() {
            return Err(Ec2KitError::SelectionCancelled(label.to_string()));
        }

        picked.sort_unstable();
        picked.dedup();
        if let Some(&bad) = picked.iter().find(|&&i| i >= entries.len()) {
            return Err(Ec2KitError::InvalidInput(format!(
                "{label} index {} is out of range",
                bad + 1
            )));
        }

        debug!(label, count = picked.len(), "Selection made");

        Ok(entries
            .into_iter()
            .enumerate()
            .filter(|(i, _)| picked.contains(i))
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Like [`Selector::choose`] but requires exactly one pick
    pub fn choose_one<T: Selectable>(&self, label: &str, prompt: &str, entries: Vec<T>) -> Result<T> {
        let mut chosen = self.choose(label, prompt, entries)?;
        if chosen.len() > 1 {
            return Err(Ec2KitError::TooManySelected {
                label: label.to_string(),
                count: chosen.len(),
            });
        }
        chosen
            .pop()
            .ok_or_else(|| Ec2KitError::SelectionCancelled(label.to_string()))
    }
}

/// Values of the chosen entries
pub fn values<T: Selectable>(entries: &[T]) -> Vec<String> {
    entries.iter().map(|e| e.value().to_string()).collect()
}

/// Instance types offered by `ec2type`
pub const INSTANCE_TYPES: &[&str] = &[
    "t3.nano",
    "t3.micro",
    "t3.small",
    "t3.medium",
    "t3.large",
    "t3.xlarge",
    "t3.2xlarge",
    "t3a.micro",
    "t3a.small",
    "t3a.medium",
    "t3a.large",
    "t4g.micro",
    "t4g.small",
    "t4g.medium",
    "t4g.large",
    "m5.large",
    "m5.xlarge",
    "m5.2xlarge",
    "m5.4xlarge",
    "m6i.large",
    "m6i.xlarge",
    "m6i.2xlarge",
    "m7g.large",
    "m7g.xlarge",
    "c5.large",
    "c5.xlarge",
    "c5.2xlarge",
    "c6i.large",
    "c6i.xlarge",
    "c7g.large",
    "r5.large",
    "r5.xlarge",
    "r6i.large",
    "r6i.xlarge",
];

/// Regions offered by `init`, with a human label
pub const REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "N. Virginia"),
    ("us-east-2", "Ohio"),
    ("us-west-1", "N. California"),
    ("us-west-2", "Oregon"),
    ("ca-central-1", "Canada (Central)"),
    ("sa-east-1", "Sao Paulo"),
    ("eu-west-1", "Ireland"),
    ("eu-west-2", "London"),
    ("eu-west-3", "Paris"),
    ("eu-central-1", "Frankfurt"),
    ("eu-north-1", "Stockholm"),
    ("ap-northeast-1", "Tokyo"),
    ("ap-northeast-2", "Seoul"),
    ("ap-northeast-3", "Osaka"),
    ("ap-southeast-1", "Singapore"),
    ("ap-southeast-2", "Sydney"),
    ("ap-south-1", "Mumbai"),
];

/// Static choices for the instance type picker
pub fn instance_type_choices() -> Vec<StaticChoice> {
    INSTANCE_TYPES.iter().map(|t| StaticChoice::plain(*t)).collect()
}

/// Static choices for the region picker
pub fn region_choices() -> Vec<StaticChoice> {
    REGIONS
        .iter()
        .map(|(region, label)| StaticChoice::new(format!("{region}\t{label}"), *region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{address, instance, ScriptedPicker};
    use ec2kit_core::InstanceState;

    fn entry(id: &str, name: &str) -> InstanceEntry {
        InstanceEntry::from(&instance(id, name, InstanceState::Running))
    }

    #[test]
    fn test_instance_display_pads_all_but_last_cell() {
        let mut e = entry("i-0123456789abcdef0", "web");
        e.private_ip = "10.0.0.1".to_string();
        e.ipv6 = "2600::1".to_string();

        let line = e.display();
        // 19 chars + 4 padding for the id, then the 18 char minimum
        assert!(line.starts_with("i-0123456789abcdef0    web               running"));
        assert!(line.ends_with("10.0.0.1          2600::1"));
        assert_eq!(e.value(), "i-0123456789abcdef0");
    }

    #[test]
    fn test_tsv_is_tab_joined() {
        let e = entry("i-1", "db");
        assert_eq!(e.tsv(), "i-1\tdb\trunning\tt3.micro\t\t\t");
    }

    #[test]
    fn test_address_entry() {
        let mut a = address("eipalloc-1", "54.0.0.1", Some("i-1"));
        a.name = "web".to_string();
        let e = AddressEntry(a);
        assert_eq!(e.display(), "54.0.0.1 web");
        assert_eq!(e.value(), "eipalloc-1");
    }

    #[test]
    fn test_choose_empty_fails_before_picking() {
        let picker = ScriptedPicker::answering(vec![vec![0]]);
        let selector = Selector::new(&picker);

        let err = selector
            .choose::<InstanceEntry>("EC2", "select instances", Vec::new())
            .unwrap_err();
        assert!(matches!(err, Ec2KitError::NothingToSelect(ref l) if l == "EC2"));
        assert!(picker.shown().is_empty());
    }

    #[test]
    fn test_choose_nothing_picked_is_cancelled() {
        let picker = ScriptedPicker::answering(vec![vec![]]);
        let selector = Selector::new(&picker);

        let err = selector
            .choose("EC2", "select instances", vec![entry("i-1", "a")])
            .unwrap_err();
        assert!(matches!(err, Ec2KitError::SelectionCancelled(_)));
    }

    #[test]
    fn test_choose_returns_picked_in_list_order() {
        let picker = ScriptedPicker::answering(vec![vec![2, 0, 2]]);
        let selector = Selector::new(&picker);

        let chosen = selector
            .choose(
                "EC2",
                "select instances",
                vec![entry("i-1", "a"), entry("i-2", "b"), entry("i-3", "c")],
            )
            .unwrap();
        assert_eq!(values(&chosen), vec!["i-1".to_string(), "i-3".to_string()]);
    }

    #[test]
    fn test_choose_out_of_range() {
        let picker = ScriptedPicker::answering(vec![vec![5]]);
        let selector = Selector::new(&picker);

        let err = selector
            .choose("EC2", "select instances", vec![entry("i-1", "a")])
            .unwrap_err();
        assert!(matches!(err, Ec2KitError::InvalidInput(_)));
    }

    #[test]
    fn test_choose_one_rejects_multiple() {
        let picker = ScriptedPicker::answering(vec![vec![0, 1], vec![1]]);
        let selector = Selector::new(&picker);
        let types = instance_type_choices();

        let err = selector
            .choose_one("instance type", "select type", types.clone())
            .unwrap_err();
        assert!(matches!(err, Ec2KitError::TooManySelected { count: 2, .. }));

        let one = selector.choose_one("instance type", "select type", types).unwrap();
        assert_eq!(one.value(), "t3.micro");
    }

    #[test]
    fn test_region_choices_carry_region_value() {
        let regions = region_choices();
        assert_eq!(regions[0].value(), "us-east-1");
        assert_eq!(regions[0].display(), "us-east-1\tN. Virginia");
    }
}
