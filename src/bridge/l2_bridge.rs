//! JSON-RPC implementation of the bridge facade.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::eth::{Filter, Log};
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::BlockchainConfig;
use crate::bridge::types::{
    BridgeError, BridgeEvent, BridgeResult, ChainFamily, EventFilter, EventKind, SendData,
    TransferSentEvent, TransfersCommittedEvent,
};
use crate::bridge::BridgeFacade;

sol! {
    #[sol(rpc)]
    contract L2Bridge {
        #[derive(Debug)]
        event TransferSent(
            bytes32 indexed transferId,
            uint256 indexed chainId,
            address indexed recipient,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee,
            uint256 index,
            uint256 amountOutMin,
            uint256 deadline
        );

        #[derive(Debug)]
        event TransfersCommitted(
            uint256 indexed destinationChainId,
            bytes32 indexed rootHash,
            uint256 totalAmount,
            uint256 rootCommittedAt
        );

        function pendingTransferIdsForChainId(uint256 chainId, uint256 index) external view returns (bytes32);
        function maxPendingTransfers() external view returns (uint256);
        function pendingAmountForChainId(uint256 chainId) external view returns (uint256);
        function lastCommitTimeForChainId(uint256 chainId) external view returns (uint256);
        function minimumForceCommitDelay() external view returns (uint256);
        function getIsBonder(address maybeBonder) external view returns (bool);
        function commitTransfers(uint256 destinationChainId) external;
        function send(
            uint256 chainId,
            address recipient,
            uint256 amount,
            uint256 bonderFee,
            uint256 amountOutMin,
            uint256 deadline
        ) external payable;
    }
}

/// Calldata for `commitTransfers(chain_id)`.
pub fn encode_commit_transfers(chain_id: u64) -> Bytes {
    L2Bridge::commitTransfersCall {
        destinationChainId: U256::from(chain_id),
    }
    .abi_encode()
    .into()
}

pub fn decode_send_data(data: &[u8]) -> BridgeResult<SendData> {
    if data.is_empty() {
        return Err(BridgeError::InvalidInput("data to decode is required".into()));
    }
    let call = L2Bridge::sendCall::abi_decode(data).map_err(|e| BridgeError::Decode(e.to_string()))?;
    Ok(SendData {
        destination_chain_id: to_u64(call.chainId, "chainId")?,
        recipient: call.recipient,
        amount: call.amount,
        bonder_fee: call.bonderFee,
        amount_out_min: call.amountOutMin,
        deadline: call.deadline,
    })
}

fn to_u64(value: U256, field: &str) -> BridgeResult<u64> {
    u64::try_from(value).map_err(|_| BridgeError::Decode(format!("{} {} does not fit in u64", field, value)))
}

fn chain_topic(chain_id: u64) -> B256 {
    B256::from(U256::from(chain_id))
}

fn decode_log(kind: EventKind, log: &Log) -> BridgeResult<BridgeEvent> {
    let block_number = log.block_number.unwrap_or_default();
    let log_index = log.log_index.unwrap_or_default();
    let tx_hash = log.transaction_hash;

    match kind {
        EventKind::TransferSent => {
            let decoded = log
                .log_decode::<L2Bridge::TransferSent>()
                .map_err(|e| BridgeError::Decode(e.to_string()))?;
            let event = decoded.inner.data;
            Ok(BridgeEvent::TransferSent(TransferSentEvent {
                transfer_id: event.transferId,
                destination_chain_id: to_u64(event.chainId, "chainId")?,
                recipient: event.recipient,
                amount: event.amount,
                transfer_nonce: event.transferNonce,
                bonder_fee: event.bonderFee,
                index: event.index,
                amount_out_min: event.amountOutMin,
                deadline: event.deadline,
                block_number,
                log_index,
                tx_hash,
            }))
        }
        EventKind::TransfersCommitted => {
            let decoded = log
                .log_decode::<L2Bridge::TransfersCommitted>()
                .map_err(|e| BridgeError::Decode(e.to_string()))?;
            let event = decoded.inner.data;
            Ok(BridgeEvent::TransfersCommitted(TransfersCommittedEvent {
                destination_chain_id: to_u64(event.destinationChainId, "destinationChainId")?,
                root_hash: event.rootHash,
                total_amount: event.totalAmount,
                root_committed_at: to_u64(event.rootCommittedAt, "rootCommittedAt")?,
                block_number,
                log_index,
                tx_hash,
            }))
        }
    }
}

/// Bridge facade over an HTTP JSON-RPC endpoint.
pub struct L2BridgeClient {
    contract: L2Bridge::L2BridgeInstance<DynProvider>,
    provider: DynProvider,
    family: ChainFamily,
    bonder: Address,
    timeout_duration: Duration,
}

impl L2BridgeClient {
    pub fn new(
        config: &BlockchainConfig,
        bridge_address: Address,
        family: ChainFamily,
        bonder: Address,
    ) -> BridgeResult<Self> {
        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| BridgeError::InvalidInput(format!("Invalid RPC URL '{}': {}", config.rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        let contract = L2Bridge::new(bridge_address, provider.clone());

        tracing::info!(
            bridge = %bridge_address,
            family = ?family,
            bonder = %bonder,
            "Bridge client initialized"
        );

        Ok(Self {
            contract,
            provider,
            family,
            bonder,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
        })
    }

    async fn rpc<T, E, F>(&self, op: &'static str, fut: F) -> BridgeResult<T>
    where
        E: std::fmt::Display,
        F: IntoFuture<Output = Result<T, E>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BridgeError::Rpc(format!("{}: {}", op, e))),
            Err(_) => Err(BridgeError::Rpc(format!("{}: timed out", op))),
        }
    }
}

/// Whether an RPC error reports an EVM revert rather than a transport failure.
fn is_revert_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("revert") || message.contains("invalid opcode")
}

#[async_trait]
impl BridgeFacade for L2BridgeClient {
    fn chain_family(&self) -> ChainFamily {
        self.family
    }

    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn source_chain_id(&self) -> BridgeResult<u64> {
        self.rpc("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn latest_block(&self) -> BridgeResult<u64> {
        self.rpc("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn query_filter(&self, filter: &EventFilter, from_block: u64, to_block: u64) -> BridgeResult<Vec<BridgeEvent>> {
        let base = Filter::new()
            .address(self.address())
            .from_block(from_block)
            .to_block(to_block);
        let query = match (filter.kind, filter.destination_chain_id) {
            (EventKind::TransferSent, None) => base.event(L2Bridge::TransferSent::SIGNATURE),
            (EventKind::TransferSent, Some(id)) => base.event(L2Bridge::TransferSent::SIGNATURE).topic2(chain_topic(id)),
            (EventKind::TransfersCommitted, None) => base.event(L2Bridge::TransfersCommitted::SIGNATURE),
            (EventKind::TransfersCommitted, Some(id)) => {
                base.event(L2Bridge::TransfersCommitted::SIGNATURE).topic1(chain_topic(id))
            }
        };

        let logs = self.rpc("eth_getLogs", self.provider.get_logs(&query)).await?;
        let mut events = logs
            .iter()
            .map(|log| decode_log(filter.kind, log))
            .collect::<BridgeResult<Vec<_>>>()?;
        events.sort_by_key(BridgeEvent::position);
        Ok(events)
    }

    async fn get_pending_transfers(&self, chain_id: u64) -> BridgeResult<Vec<B256>> {
        let max = self
            .rpc("maxPendingTransfers", self.contract.maxPendingTransfers().call())
            .await?;
        let max = to_u64(max, "maxPendingTransfers")?;
        let chain = U256::from(chain_id);

        let mut pending = Vec::new();
        for i in 0..max {
            let index = U256::from(i);
            match self
                .rpc(
                    "pendingTransferIdsForChainId",
                    self.contract.pendingTransferIdsForChainId(chain, index).call(),
                )
                .await
            {
                Ok(id) => pending.push(id),
                // Reading past the end of the list reverts.
                Err(BridgeError::Rpc(message)) if is_revert_message(&message) => {
                    tracing::debug!(chain_id, index = i, "End of pending transfers");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(pending)
    }

    async fn get_pending_amount_for_chain_id(&self, chain_id: u64) -> BridgeResult<U256> {
        self.rpc(
            "pendingAmountForChainId",
            self.contract.pendingAmountForChainId(U256::from(chain_id)).call(),
        )
        .await
    }

    async fn get_last_commit_time_for_chain_id(&self, chain_id: u64) -> BridgeResult<u64> {
        let time = self
            .rpc(
                "lastCommitTimeForChainId",
                self.contract.lastCommitTimeForChainId(U256::from(chain_id)).call(),
            )
            .await?;
        to_u64(time, "lastCommitTimeForChainId")
    }

    async fn get_minimum_force_commit_delay(&self) -> BridgeResult<u64> {
        let delay = self
            .rpc("minimumForceCommitDelay", self.contract.minimumForceCommitDelay().call())
            .await?;
        to_u64(delay, "minimumForceCommitDelay")
    }

    async fn is_bonder(&self) -> BridgeResult<bool> {
        self.rpc("getIsBonder", self.contract.getIsBonder(self.bonder).call()).await
    }
}
