use std::io::{self, Write};

use serde::Serialize;

use crate::admin::ApplicationStatus;
use crate::metacard::Metacard;
use crate::operation::{
    CreateResponse, DeleteResponse, ProcessingDetail, QueryResponse, ResourceResponse,
    UpdateResponse,
};
use crate::ops::source::SourceInfoResponse;
use crate::query::QueryResult;
use crate::source::SourceDescriptor;

#[derive(Debug, Serialize)]
struct MetacardsSummary<'a> {
    operation: &'static str,
    count: usize,
    metacards: Vec<&'a Metacard>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processing_details: Vec<&'a ProcessingDetail>,
}

#[derive(Debug, Serialize)]
struct QuerySummary<'a> {
    hits: u64,
    results: &'a [QueryResult],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processing_details: Vec<&'a ProcessingDetail>,
}

#[derive(Debug, Serialize)]
struct ResourceSummary<'a> {
    name: &'a str,
    mime_type: &'a str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SourcesSummary<'a> {
    sources: Vec<&'a SourceDescriptor>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_create(response: &CreateResponse) -> io::Result<()> {
        Self::print_json(&MetacardsSummary {
            operation: "create",
            count: response.created.len(),
            metacards: response.created.iter().collect(),
            processing_details: response.processing_details.iter().collect(),
        })
    }

    pub fn print_update(response: &UpdateResponse) -> io::Result<()> {
        Self::print_json(&MetacardsSummary {
            operation: "update",
            count: response.updated.len(),
            metacards: response.updated.iter().map(|update| &update.new).collect(),
            processing_details: response.processing_details.iter().collect(),
        })
    }

    pub fn print_delete(response: &DeleteResponse) -> io::Result<()> {
        Self::print_json(&MetacardsSummary {
            operation: "delete",
            count: response.deleted.len(),
            metacards: response.deleted.iter().collect(),
            processing_details: response.processing_details.iter().collect(),
        })
    }

    pub fn print_query(response: &QueryResponse) -> io::Result<()> {
        Self::print_json(&QuerySummary {
            hits: response.hits,
            results: &response.results,
            processing_details: response.processing_details.iter().collect(),
        })
    }

    /// Describes a retrieved resource; the bytes themselves go to `output`.
    pub fn print_resource(response: &ResourceResponse, output: Option<&str>) -> io::Result<()> {
        Self::print_json(&ResourceSummary {
            name: &response.resource.name,
            mime_type: &response.resource.mime_type,
            size: response.resource.size(),
            output,
        })
    }

    pub fn print_sources(response: &SourceInfoResponse) -> io::Result<()> {
        Self::print_json(&SourcesSummary {
            sources: response.descriptors.iter().collect(),
        })
    }

    pub fn print_status(status: &ApplicationStatus) -> io::Result<()> {
        Self::print_json(status)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
