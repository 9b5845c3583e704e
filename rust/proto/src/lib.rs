//! Generated protobuf types for the version file and lineage file blobs.
//! See `proto/catalog.proto` for the wire schema.

include!(concat!(env!("OUT_DIR"), "/catalog.rs"));
