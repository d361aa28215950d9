mod data_set_writer;
mod field_filter;
mod heartbeat;
mod meta_data;
mod watchdog;
mod writer_group;

use std::sync::Arc;

use chrono::Duration;

use crate::pubsub::{data_set_writer::*, diagnostics::WriterGroupDiagnostics, models::*};
use crate::types::*;

pub fn t0() -> DateTime {
    DateTime::ymd_hms(2024, 3, 1, 12, 0, 0)
}

pub fn at_ms(millis: i64) -> DateTime {
    t0() + Duration::milliseconds(millis)
}

pub fn variable(id: &str) -> PublishedDataSetVariableModel {
    PublishedDataSetVariableModel::new(id.to_string(), format!("ns=2;s={}", id))
}

pub fn data_set(variables: Vec<PublishedDataSetVariableModel>) -> PublishedDataSetModel {
    PublishedDataSetModel {
        name: Some("DataSet".into()),
        data_set_source: PublishedDataSetSource::PublishedVariables(variables),
        ..Default::default()
    }
}

pub fn writer_model(id: u16, variables: Vec<PublishedDataSetVariableModel>) -> DataSetWriterModel {
    DataSetWriterModel {
        data_set_writer_id: id,
        id: format!("Writer{}", id),
        data_set: Some(data_set(variables)),
        ..Default::default()
    }
}

pub fn diagnostics() -> Arc<WriterGroupDiagnostics> {
    Arc::new(WriterGroupDiagnostics::new(1, "Group", t0()))
}

pub fn writer(model: DataSetWriterModel) -> DataSetWriter {
    DataSetWriter::new(
        model,
        "Group",
        MessageEncoding::JSON,
        WriterDefaults::default(),
        diagnostics(),
    )
}

pub fn data_change(field_id: &str, value: DataValue) -> crate::pubsub::notification::Notification {
    crate::pubsub::notification::Notification::DataChange {
        field_id: field_id.to_string(),
        value,
    }
}
