// @generated by ngcs-gen from service.ngcs. Do not edit.

impl ::ngcs::marshal::Marshal for Exit {
    fn marshal(&self, out: Option<&mut ::ngcs::bytes::BytesMut>) -> usize {
        let mut w = ::ngcs::marshal::StructWriter::new(out);
        w.int(self.code);
        w.int(self.signal);
        w.finish()
    }
}

impl ::ngcs::marshal::Unmarshal for Exit {
    fn unmarshal(payload: &[u8]) -> ::ngcs::Result<Self> {
        let mut r = ::ngcs::marshal::StructReader::new("Exit", payload, 2)?;
        let code = r.int("code")?;
        let signal = r.int("signal")?;
        Ok(Self {
            code,
            signal,
        })
    }
}

impl ::ngcs::marshal::Marshal for Service {
    fn marshal(&self, out: Option<&mut ::ngcs::bytes::BytesMut>) -> usize {
        let mut w = ::ngcs::marshal::StructWriter::new(out);
        w.string(&self.name);
        w.sized(::ngcs::ipc::value::TypeCode::String, &self.label, self.label_len);
        w.sized(::ngcs::ipc::value::TypeCode::Blob, &self.env, self.env_len);
        w.long(self.started);
        w.record(&self.exit);
        w.optional(self.parent.as_deref());
        w.finish()
    }
}

impl ::ngcs::marshal::Unmarshal for Service {
    fn unmarshal(payload: &[u8]) -> ::ngcs::Result<Self> {
        let mut r = ::ngcs::marshal::StructReader::new("Service", payload, 6)?;
        let name = r.string("name")?;
        let (label, label_len) = r.sized("label", ::ngcs::ipc::value::TypeCode::String)?;
        let (env, env_len) = r.sized("env", ::ngcs::ipc::value::TypeCode::Blob)?;
        let started = r.long("started")?;
        let exit = r.record::<Exit>("exit")?;
        let parent = r.optional::<Exit>("parent")?;
        let cache = None;
        Ok(Self {
            name,
            label,
            label_len,
            env,
            env_len,
            started,
            exit,
            parent,
            cache,
        })
    }
}

impl ::ngcs::marshal::Marshal for Marker {
    fn marshal(&self, out: Option<&mut ::ngcs::bytes::BytesMut>) -> usize {
        ::ngcs::marshal::StructWriter::new(out).finish()
    }
}

impl ::ngcs::marshal::Unmarshal for Marker {
    fn unmarshal(payload: &[u8]) -> ::ngcs::Result<Self> {
        ::ngcs::marshal::StructReader::new("Marker", payload, 0)?;
        Ok(Self {})
    }
}
