use ofcore_codec::MessageType;

/// Outbound queue priority for a message type. Lower values are written first.
pub fn priority_of(msg_type: MessageType) -> i32 {
    match msg_type {
        MessageType::Hello => -1100,
        MessageType::FeaturesRequest | MessageType::FeaturesReply => -1099,
        MessageType::SetConfig
        | MessageType::GetConfigRequest
        | MessageType::GetConfigReply
        | MessageType::QueueGetConfigRequest
        | MessageType::QueueGetConfigReply => -1090,
        MessageType::EchoRequest | MessageType::EchoReply => -1080,
        MessageType::MultipartRequest | MessageType::MultipartReply => -1070,
        MessageType::Error => -1050,
        MessageType::PacketIn
        | MessageType::PortStatus
        | MessageType::FlowRemoved
        | MessageType::PacketOut => -1000,
        MessageType::PortMod | MessageType::GroupMod | MessageType::TableMod => 900,
        MessageType::FlowMod
        | MessageType::BarrierRequest
        | MessageType::BarrierReply
        | MessageType::Experimenter => 1000,
        MessageType::RoleRequest
        | MessageType::RoleReply
        | MessageType::GetAsyncRequest
        | MessageType::GetAsyncReply
        | MessageType::SetAsync
        | MessageType::MeterMod => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_messages_go_first() {
        assert!(priority_of(MessageType::Hello) < priority_of(MessageType::FeaturesRequest));
        assert!(priority_of(MessageType::FeaturesRequest) < priority_of(MessageType::SetConfig));
        assert!(priority_of(MessageType::SetConfig) < priority_of(MessageType::EchoReply));
        assert!(priority_of(MessageType::EchoReply) < priority_of(MessageType::MultipartRequest));
    }

    #[test]
    fn flow_mods_after_port_mods() {
        assert_eq!(priority_of(MessageType::PortMod), 900);
        assert_eq!(priority_of(MessageType::FlowMod), 1000);
        assert_eq!(priority_of(MessageType::MeterMod), 0);
        assert_eq!(priority_of(MessageType::Error), -1050);
    }
}
