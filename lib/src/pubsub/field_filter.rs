// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Per field filtering of sampled values: data change trigger, deadband, skip first and
//! substitution of bad reads.

use crate::pubsub::models::*;
use crate::types::*;

/// Minimum change a numeric value must make before it is reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deadband {
    Absolute(f64),
    /// Percent of the engineering units range. Without a range it acts as absolute.
    Percent(f64, Option<EngineeringUnitsRange>),
}

impl Deadband {
    /// The absolute threshold the change is compared against
    pub fn threshold(&self) -> f64 {
        match *self {
            Deadband::Absolute(d) => d,
            Deadband::Percent(d, Some(range)) => d / 100.0 * range.span(),
            Deadband::Percent(d, None) => d,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldFilter {
    trigger: DataChangeTriggerType,
    deadband: Option<Deadband>,
    skip_first: bool,
    substitute_value: Option<Variant>,
    /// The next value is the first after activation
    first_pending: bool,
}

impl Default for FieldFilter {
    fn default() -> Self {
        Self {
            trigger: DataChangeTriggerType::default(),
            deadband: None,
            skip_first: false,
            substitute_value: None,
            first_pending: true,
        }
    }
}

impl FieldFilter {
    /// Builds the filter of a published variable. An invalid deadband is reported as
    /// `BadMonitoredItemFilterInvalid`.
    pub fn new(variable: &PublishedDataSetVariableModel) -> Result<FieldFilter, StatusCode> {
        let deadband = match (variable.deadband_type, variable.deadband_value) {
            (Some(deadband_type), Some(value)) => {
                if !value.is_finite() || value < 0.0 {
                    error!(
                        "Field {} has invalid deadband value {}",
                        variable.field_id(),
                        value
                    );
                    return Err(StatusCode::BadMonitoredItemFilterInvalid);
                }
                match deadband_type {
                    DeadbandType::Absolute => Some(Deadband::Absolute(value)),
                    DeadbandType::Percent => {
                        if value > 100.0 {
                            error!(
                                "Field {} has percent deadband {} above 100",
                                variable.field_id(),
                                value
                            );
                            return Err(StatusCode::BadMonitoredItemFilterInvalid);
                        }
                        if variable.engineering_units_range.is_none() {
                            debug!(
                                "Field {} has no engineering units range, percent deadband is absolute",
                                variable.field_id()
                            );
                        }
                        Some(Deadband::Percent(value, variable.engineering_units_range))
                    }
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    "Field {} sets only one of deadband type and value, deadband is ignored",
                    variable.field_id()
                );
                None
            }
            (None, None) => None,
        };
        Ok(FieldFilter {
            trigger: variable.data_change_trigger.unwrap_or_default(),
            deadband,
            skip_first: variable.skip_first.unwrap_or(false),
            substitute_value: variable.substitute_value.clone(),
            first_pending: true,
        })
    }

    pub fn trigger(&self) -> DataChangeTriggerType {
        self.trigger
    }

    pub fn deadband(&self) -> Option<Deadband> {
        self.deadband
    }

    /// Rearms skip first, e.g. after the subscription was recreated
    pub fn activate(&mut self) {
        self.first_pending = true;
    }

    /// Decides whether the incoming value is reported given the previously reported one, and
    /// returns the value to report.
    pub fn apply(&mut self, previous: Option<&DataValue>, incoming: DataValue) -> (bool, DataValue) {
        let first = self.first_pending;
        self.first_pending = false;
        if first && self.skip_first {
            trace!("Skipping first value {:?}", incoming.value);
            return (false, incoming);
        }

        if incoming.is_bad_or_empty() {
            if let Some(ref substitute) = self.substitute_value {
                let value = DataValue {
                    value: Some(substitute.clone()),
                    status: Some(StatusCode::UncertainSubstituteValue),
                    ..incoming
                };
                return (true, value);
            }
        }

        let emit = match previous {
            None => true,
            Some(previous) => self.is_change(previous, &incoming),
        };
        (emit, incoming)
    }

    fn is_change(&self, previous: &DataValue, incoming: &DataValue) -> bool {
        let status_changed = previous.status() != incoming.status();
        match self.trigger {
            DataChangeTriggerType::Status => status_changed,
            DataChangeTriggerType::StatusValue => status_changed || self.value_changed(previous, incoming),
            DataChangeTriggerType::StatusValueTimestamp => {
                status_changed
                    || self.value_changed(previous, incoming)
                    || previous.source_timestamp != incoming.source_timestamp
            }
        }
    }

    fn value_changed(&self, previous: &DataValue, incoming: &DataValue) -> bool {
        let threshold = self.deadband.map(|d| d.threshold()).unwrap_or(0.0);
        match (&previous.value, &incoming.value) {
            (Some(p), Some(i)) if threshold > 0.0 => exceeds_deadband(p, i, threshold),
            (p, i) => p != i,
        }
    }
}

/// Compares numeric scalars or arrays against the threshold. Anything else is compared by value.
fn exceeds_deadband(previous: &Variant, incoming: &Variant, threshold: f64) -> bool {
    match (previous, incoming) {
        (Variant::Array(p), Variant::Array(i)) => {
            p.values.len() != i.values.len()
                || p.values
                    .iter()
                    .zip(i.values.iter())
                    .any(|(p, i)| exceeds_deadband(p, i, threshold))
        }
        (p, i) => match (p.as_f64(), i.as_f64()) {
            (Some(p), Some(i)) => (i - p).abs() >= threshold,
            _ => p != i,
        },
    }
}
