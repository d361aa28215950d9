// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Packs the data set messages of a publishing cycle into network messages that respect the
//! ordering of the group and its maximum network message size.

use crate::error::PublisherError;
use crate::pubsub::{data_set_message::*, encoder::Encoder, models::*, network_message::*};

/// Outcome of packing one publishing cycle
#[derive(Debug, Default)]
pub(crate) struct PackResult {
    pub messages: Vec<NetworkMessage>,
    /// Data set messages that had to be split over several network messages
    pub split: usize,
    /// Fields or messages that could not fit even on their own
    pub dropped_notifications: usize,
    /// Data set messages whose size could not be computed
    pub errors: usize,
}

/// Allowance per appended message for separators, counts and size fields that a message alone
/// does not carry
const APPEND_SLACK: usize = 8;

struct Packer<'a> {
    encoder: &'a Encoder,
    header: &'a NetworkMessage,
    max_size: usize,
    /// Body size of a network message without data set messages
    base: usize,
    result: PackResult,
}

pub(crate) fn pack(
    encoder: &Encoder,
    header: &NetworkMessage,
    mut messages: Vec<DataSetMessage>,
    ordering: DataSetOrderingType,
    max_size: usize,
) -> PackResult {
    if ordering != DataSetOrderingType::Undefined {
        // Stable, so messages of one writer keep their sequence
        messages.sort_by_key(|m| m.data_set_writer_id);
    }
    let single = header
        .content_mask
        .contains(NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE);
    let single_per_writer = ordering == DataSetOrderingType::AscendingWriterIdSingle;

    let mut packer = Packer {
        encoder,
        header,
        max_size,
        base: encoder
            .body_size(&NetworkMessage::new_data(header, Vec::new()))
            .unwrap_or(0),
        result: PackResult::default(),
    };

    // Messages of the network message being filled and an upper bound of its body size
    let mut current: Vec<DataSetMessage> = Vec::new();
    let mut current_size = 0;
    for dsm in messages {
        let must_close = !current.is_empty()
            && (single
                || (single_per_writer
                    && current
                        .iter()
                        .any(|m| m.data_set_writer_id == dsm.data_set_writer_id)));
        if must_close {
            packer.close(std::mem::take(&mut current));
        }

        let Some(marginal) = packer.marginal(std::slice::from_ref(&dsm), packer.base) else {
            packer.result.errors += 1;
            continue;
        };

        if !current.is_empty() {
            let estimate = current_size + marginal;
            let fits = packer.within(estimate) || {
                let mut candidate = current.clone();
                candidate.push(dsm.clone());
                packer.fits(&candidate) == Some(true)
            };
            if fits {
                current.push(dsm);
                current_size = estimate;
                continue;
            }
            packer.close(std::mem::take(&mut current));
        }

        current_size = packer.base + marginal;
        if packer.within(current_size) {
            current.push(dsm);
            continue;
        }
        match packer.fits(std::slice::from_ref(&dsm)) {
            Some(true) => current.push(dsm),
            Some(false) => packer.split(dsm),
            None => {
                packer.result.errors += 1;
            }
        }
    }
    packer.close(current);
    packer.result
}

impl<'a> Packer<'a> {
    /// True if the messages fit into one network message, `None` if the size is unknown. This
    /// encodes the whole network message.
    fn fits(&self, messages: &[DataSetMessage]) -> Option<bool> {
        let message = NetworkMessage::new_data(self.header, messages.to_vec());
        match self.encoder.estimate_size(&message) {
            Ok(size) => Some(size <= self.max_size),
            Err(err) => {
                self.size_error(err);
                None
            }
        }
    }

    /// True if a message whose body is at most `body_size` bytes certainly fits
    fn within(&self, body_size: usize) -> bool {
        self.encoder.size_bound(body_size) <= self.max_size
    }

    /// Bytes that the messages add to a network message whose body is `base` bytes
    fn marginal(&self, messages: &[DataSetMessage], base: usize) -> Option<usize> {
        let message = NetworkMessage::new_data(self.header, messages.to_vec());
        match self.encoder.body_size(&message) {
            Ok(size) => Some(size.saturating_sub(base) + APPEND_SLACK),
            Err(err) => {
                self.size_error(err);
                None
            }
        }
    }

    fn size_error(&self, err: PublisherError) {
        error!(
            "Cannot compute the size of a message of writer group {}, {}",
            self.header.writer_group_id, err
        );
    }

    fn close(&mut self, messages: Vec<DataSetMessage>) {
        if !messages.is_empty() {
            self.result
                .messages
                .push(NetworkMessage::new_data(self.header, messages));
        }
    }

    /// Spreads the fields of an oversized data set message over as many network messages as it
    /// takes. A field that is too big on its own is dropped.
    fn split(&mut self, dsm: DataSetMessage) {
        let fields = dsm.payload.fields().to_vec();
        if fields.is_empty() {
            warn!(
                "Message of writer {} exceeds the maximum network message size of {} bytes without any fields",
                dsm.data_set_writer_name, self.max_size
            );
            self.result.dropped_notifications += 1;
            return;
        }
        debug!(
            "Splitting message {} of writer {} with {} fields",
            dsm.sequence_number,
            dsm.data_set_writer_name,
            fields.len()
        );
        self.result.split += 1;

        let base = self
            .encoder
            .body_size(&NetworkMessage::new_data(self.header, vec![dsm.with_fields(Vec::new())]))
            .unwrap_or(0);
        let mut part: Vec<DataSetField> = Vec::new();
        let mut part_size = 0;
        for field in fields {
            let Some(marginal) = self.marginal(&[dsm.with_fields(vec![field.clone()])], base) else {
                self.result.errors += 1;
                continue;
            };
            if !part.is_empty() {
                let estimate = part_size + marginal;
                let fits = self.within(estimate) || {
                    let mut candidate = part.clone();
                    candidate.push(field.clone());
                    self.fits(&[dsm.with_fields(candidate)]) == Some(true)
                };
                if fits {
                    part.push(field);
                    part_size = estimate;
                    continue;
                }
                let done = std::mem::take(&mut part);
                self.close(vec![dsm.with_fields(done)]);
            }
            part_size = base + marginal;
            if self.within(part_size) {
                part.push(field);
                continue;
            }
            match self.fits(&[dsm.with_fields(vec![field.clone()])]) {
                Some(true) => part.push(field),
                Some(false) => {
                    warn!(
                        "Field {} of writer {} exceeds the maximum network message size of {} bytes and is dropped",
                        field.name, dsm.data_set_writer_name, self.max_size
                    );
                    self.result.dropped_notifications += 1;
                }
                None => self.result.errors += 1,
            }
        }
        if !part.is_empty() {
            self.close(vec![dsm.with_fields(part)]);
        }
    }
}
