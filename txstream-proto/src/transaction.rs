/// One physical client write: an ordered batch of requests.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Client {
    #[prost(message, repeated, tag = "1")]
    pub reqs: ::prost::alloc::vec::Vec<Req>,
}

/// One physical server write.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Server {
    #[prost(oneof = "server::Server", tags = "1, 2")]
    pub server: ::core::option::Option<server::Server>,
}

/// Nested message and enum types in `Server`.
pub mod server {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Server {
        #[prost(message, tag = "1")]
        Res(super::Res),
        #[prost(message, tag = "2")]
        ResPart(super::ResPart),
    }
}

/// Request envelope. `req_id` is a 16 byte UUID chosen by the client.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Req {
    #[prost(bytes = "vec", tag = "1")]
    pub req_id: ::prost::alloc::vec::Vec<u8>,
    #[prost(map = "string, string", tag = "2")]
    pub metadata: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
    #[prost(oneof = "req::Req", tags = "3, 4, 5, 6, 7")]
    pub req: ::core::option::Option<req::Req>,
}

/// Nested message and enum types in `Req`.
pub mod req {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Req {
        #[prost(message, tag = "3")]
        OpenReq(super::open::Req),
        #[prost(message, tag = "4")]
        CommitReq(super::commit::Req),
        #[prost(message, tag = "5")]
        RollbackReq(super::rollback::Req),
        #[prost(message, tag = "6")]
        QueryReq(super::query::Req),
        /// Asks the server for the next page of a streamed response.
        #[prost(message, tag = "7")]
        StreamReq(super::stream::Req),
    }
}

/// Single-shot response envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Res {
    #[prost(bytes = "vec", tag = "1")]
    pub req_id: ::prost::alloc::vec::Vec<u8>,
    #[prost(oneof = "res::Res", tags = "2, 3, 4, 5")]
    pub res: ::core::option::Option<res::Res>,
}

/// Nested message and enum types in `Res`.
pub mod res {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Res {
        #[prost(message, tag = "2")]
        OpenRes(super::open::Res),
        #[prost(message, tag = "3")]
        CommitRes(super::commit::Res),
        #[prost(message, tag = "4")]
        RollbackRes(super::rollback::Res),
        #[prost(message, tag = "5")]
        QueryRes(super::query::Res),
    }
}

/// One part of a paginated response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResPart {
    #[prost(bytes = "vec", tag = "1")]
    pub req_id: ::prost::alloc::vec::Vec<u8>,
    #[prost(oneof = "res_part::Res", tags = "2, 3")]
    pub res: ::core::option::Option<res_part::Res>,
}

/// Nested message and enum types in `ResPart`.
pub mod res_part {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Res {
        /// Pagination control: the server paused (`CONTINUE`) or finished (`DONE`).
        #[prost(message, tag = "2")]
        StreamResPart(super::stream::ResPart),
        #[prost(message, tag = "3")]
        QueryResPart(super::query::ResPart),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Options {
    #[prost(bool, optional, tag = "1")]
    pub infer: ::core::option::Option<bool>,
    #[prost(int32, optional, tag = "2")]
    pub prefetch_size: ::core::option::Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub transaction_timeout_millis: ::core::option::Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Type {
    Read = 0,
    Write = 1,
}

pub mod open {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Req {
        #[prost(bytes = "vec", tag = "1")]
        pub session_id: ::prost::alloc::vec::Vec<u8>,
        #[prost(enumeration = "super::Type", tag = "2")]
        pub r#type: i32,
        #[prost(message, optional, tag = "3")]
        pub options: ::core::option::Option<super::Options>,
        #[prost(int32, tag = "4")]
        pub network_latency_millis: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Res {
        /// Time the server spent opening the transaction.
        #[prost(int32, tag = "1")]
        pub server_duration_millis: i32,
    }
}

pub mod commit {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Req {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Res {}
}

pub mod rollback {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Req {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Res {}
}

pub mod query {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Req {
        #[prost(string, tag = "1")]
        pub query: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "2")]
        pub options: ::core::option::Option<super::Options>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Res {
        #[prost(bytes = "vec", tag = "1")]
        pub answer: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResPart {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub answers: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    }
}

pub mod stream {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Req {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResPart {
        #[prost(enumeration = "res_part::State", tag = "1")]
        pub state: i32,
    }

    /// Nested message and enum types in `ResPart`.
    pub mod res_part {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum State {
            Continue = 0,
            Done = 1,
        }
    }
}
