pub mod infergate {
    pub mod v1 {
        tonic::include_proto!("infergate.v1");
    }
}

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("infergate_descriptor");
