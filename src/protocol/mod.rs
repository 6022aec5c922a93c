//! Wire protocol messages
//!
//! Request builders and reply decoders for the MySQL-family wire format:
//! text commands, binary prepare/execute/fetch, bulk batches, and the
//! large-object piece sub-protocol. Each request builder produces fully
//! framed bytes ready for the transport; reply decoders consume the byte
//! stream the transport returned for the round trip.

pub mod command;
pub mod execute;
pub mod fetch;
pub mod frame;
pub mod lob;
pub mod prepare;
pub mod resultset;

pub use command::{ExecOutcome, QueryMessage};
pub use execute::{BulkExecuteMessage, ExecuteMessage, ExecuteOptions, LongDataMessage, StmtCloseMessage};
pub use fetch::{FetchMessage, FetchReply};
pub use frame::{read_reply_packets, write_command_frame};
pub use lob::{LobOpAck, LobOpMessage, LobPieceData};
pub use prepare::{PrepareMessage, PrepareResponse};
pub use resultset::{parse_column_definition, write_column_definition, ResultSet, TerminalPacket};
